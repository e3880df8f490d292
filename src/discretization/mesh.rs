/// A node of a structured quadrilateral grid.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: usize,
    pub position: [f64; 3],
    /// Boundary tags such as "bottom", "top", "left", "right", "interface".
    pub labels: Vec<String>,
}

/// Logically rectangular grid of `nx` x `ny` nodes, numbered row by row.
#[derive(Clone, Debug)]
pub struct StructuredGrid {
    pub nodes: Vec<Node>,
    pub nx: usize,
    pub ny: usize,
}

impl StructuredGrid {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_index(&self, i: usize, j: usize) -> usize {
        j * self.nx + i
    }

    /// Edge-connected neighbours of node `idx`.
    pub fn neighbors(&self, idx: usize) -> Vec<usize> {
        let (i, j) = (idx % self.nx, idx / self.nx);
        let mut out = Vec::with_capacity(4);
        if i > 0 {
            out.push(idx - 1);
        }
        if i + 1 < self.nx {
            out.push(idx + 1);
        }
        if j > 0 {
            out.push(idx - self.nx);
        }
        if j + 1 < self.ny {
            out.push(idx + self.nx);
        }
        out
    }

    pub fn nodes_with_label<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.labels.iter().any(|l| l == label))
    }

    pub fn has_label(&self, idx: usize, label: &str) -> bool {
        self.nodes[idx].labels.iter().any(|l| l == label)
    }
}
