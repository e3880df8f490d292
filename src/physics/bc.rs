use std::sync::Arc;

use crate::linalg::DofMap;

/// Field identifier stored as a runtime string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field(pub Arc<str>);

impl Field {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }
}

impl<T: Into<Arc<str>>> From<T> for Field {
    fn from(name: T) -> Self {
        Field::new(name)
    }
}

/// Geometric point in space.
#[derive(Clone, Copy, Debug)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<[f64; 3]> for Point {
    fn from(p: [f64; 3]) -> Self {
        Self {
            x: p[0],
            y: p[1],
            z: p[2],
        }
    }
}

/// Shared prescribed-value function of time and position.
pub type SFn = Arc<dyn Fn(f64, Point) -> f64 + Send + Sync>;

/// Local trait allowing convenient conversion into [`SFn`].
pub trait IntoSFn {
    fn into_sfn(self) -> SFn;
}

impl IntoSFn for f64 {
    fn into_sfn(self) -> SFn {
        Arc::new(move |_, _| self)
    }
}

impl<F> IntoSFn for F
where
    F: Fn(f64, Point) -> f64 + Send + Sync + 'static,
{
    fn into_sfn(self) -> SFn {
        Arc::new(self)
    }
}

#[derive(Clone)]
pub enum BoundarySelector {
    Label(String),
    Predicate(Arc<dyn Fn(Point) -> bool + Send + Sync>),
}

/// Prescribed values for some components of a field on part of the boundary.
#[derive(Clone)]
pub struct DirichletRule {
    pub field: Field,
    /// Node-local DOF indices the rule constrains.
    pub components: Vec<usize>,
    pub on: BoundarySelector,
    pub value: SFn,
}

impl DirichletRule {
    pub fn new(
        field: impl Into<Field>,
        components: &[usize],
        on: BoundarySelector,
        value: impl IntoSFn,
    ) -> Self {
        Self {
            field: field.into(),
            components: components.to_vec(),
            on,
            value: value.into_sfn(),
        }
    }

    fn selects(&self, node: &BoundaryNode<'_>) -> bool {
        match &self.on {
            BoundarySelector::Label(l) => node.labels.iter().any(|nl| nl == l),
            BoundarySelector::Predicate(pred) => pred(node.position),
        }
    }
}

/// The view of a node a rule is matched against.
pub struct BoundaryNode<'a> {
    pub position: Point,
    pub labels: &'a [String],
    pub dofs: &'a [usize],
}

#[derive(Default, Clone)]
pub struct BCRegistry {
    rules: Vec<DirichletRule>,
}

impl BCRegistry {
    pub fn add(&mut self, rule: DirichletRule) {
        self.rules.push(rule);
    }

    /// Prescribed (gid, value) pairs for `field` at time `t`. When several
    /// rules constrain the same DOF the last one added wins.
    pub fn dirichlet_values(
        &self,
        field: impl AsRef<str>,
        nodes: &[BoundaryNode<'_>],
        t: f64,
    ) -> Vec<(usize, f64)> {
        let mut values: Vec<(usize, f64)> = Vec::new();
        for rule in self.rules.iter().filter(|r| r.field.0.as_ref() == field.as_ref()) {
            for node in nodes.iter().filter(|n| rule.selects(n)) {
                for &comp in &rule.components {
                    let Some(&gid) = node.dofs.get(comp) else {
                        continue;
                    };
                    let v = (rule.value)(t, node.position);
                    match values.iter_mut().find(|(g, _)| *g == gid) {
                        Some(entry) => entry.1 = v,
                        None => values.push((gid, v)),
                    }
                }
            }
        }
        values.sort_by_key(|(g, _)| *g);
        values
    }

    pub fn dbc_map(&self, field: impl AsRef<str>, nodes: &[BoundaryNode<'_>]) -> DofMap {
        DofMap::new(
            self.dirichlet_values(field, nodes, 0.0)
                .into_iter()
                .map(|(g, _)| g),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes<'a>(labels: &'a [Vec<String>], dofs: &'a [Vec<usize>]) -> Vec<BoundaryNode<'a>> {
        labels
            .iter()
            .zip(dofs)
            .enumerate()
            .map(|(i, (l, d))| BoundaryNode {
                position: Point {
                    x: i as f64,
                    y: 0.0,
                    z: 0.0,
                },
                labels: l,
                dofs: d,
            })
            .collect()
    }

    #[test]
    fn select_by_field_label_and_component() {
        let labels = vec![vec!["top".to_string()], vec![], vec!["top".to_string()]];
        let dofs = vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8]];
        let nodes = nodes(&labels, &dofs);

        let mut reg = BCRegistry::default();
        reg.add(DirichletRule::new(
            "velocity",
            &[0, 1],
            BoundarySelector::Label("top".into()),
            |t: f64, p: Point| t * (p.x + 1.0),
        ));
        reg.add(DirichletRule::new(
            "displacement",
            &[0],
            BoundarySelector::Label("top".into()),
            0.0,
        ));

        let values = reg.dirichlet_values("velocity", &nodes, 2.0);
        assert_eq!(values, vec![(0, 2.0), (1, 2.0), (6, 6.0), (7, 6.0)]);
        assert_eq!(reg.dbc_map("displacement", &nodes).gids(), &[0, 6]);
    }

    #[test]
    fn later_rules_override() {
        let labels = vec![vec!["wall".to_string()]];
        let dofs = vec![vec![4]];
        let nodes = nodes(&labels, &dofs);
        let mut reg = BCRegistry::default();
        reg.add(DirichletRule::new("u", &[0], BoundarySelector::Label("wall".into()), 1.0));
        reg.add(DirichletRule::new(
            "u",
            &[0],
            BoundarySelector::Predicate(Arc::new(|p: Point| p.x < 0.5)),
            3.0,
        ));
        assert_eq!(reg.dirichlet_values("u", &nodes, 0.0), vec![(4, 3.0)]);
    }
}
