//! Dependency graph of services, built once from a flat collection of registrations.
//!
//! Each prerequisite name in a [ServiceDescriptor](crate::descriptor::ServiceDescriptor) becomes an
//! edge between two [ServiceNodes](ServiceNode): the prerequisite lists the service as a dependent,
//! while the service lists the prerequisite as, well, a prerequisite. The graph is validated on
//! construction - names must be unique, prerequisites must exist (unless explicitly allowed to be
//! missing) and there can be no cycles.

use crate::error::GraphError;
use crate::node::{NodeLink, ServiceNode};
use crate::registration::ServiceRegistration;
use crate::signal::CompletionSignal;
use fxhash::FxHashMap;
use itertools::Itertools;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Immutable graph of services. See module documentation for details.
#[derive(Debug)]
pub struct ServiceGraph {
    nodes: Vec<Arc<ServiceNode>>,
    indices: FxHashMap<String, usize>,
}

impl ServiceGraph {
    pub fn build(registrations: Vec<ServiceRegistration>) -> Result<Self, GraphError> {
        let indices = Self::index_names(&registrations)?;
        let (prerequisites, dependents) = Self::resolve_edges(&registrations, &indices)?;

        if let Some(cycle) = find_cycle(&prerequisites) {
            return Err(GraphError::DependencyCycle(
                cycle
                    .into_iter()
                    .map(|index| registrations[index].descriptor.name.clone())
                    .collect(),
            ));
        }

        let links = registrations
            .iter()
            .map(|registration| {
                NodeLink::new(
                    registration.descriptor.name.clone(),
                    CompletionSignal::default(),
                    CompletionSignal::default(),
                )
            })
            .collect_vec();

        let to_links =
            |indices: &[usize]| indices.iter().map(|index| links[*index].clone()).collect_vec();

        let nodes = registrations
            .into_iter()
            .enumerate()
            .map(|(index, registration)| {
                Arc::new(ServiceNode::new(
                    registration,
                    links[index].clone(),
                    to_links(&prerequisites[index]),
                    to_links(&dependents[index]),
                ))
            })
            .collect_vec();

        debug!(services = nodes.len(), "Built service graph");

        Ok(Self { nodes, indices })
    }

    fn index_names(
        registrations: &[ServiceRegistration],
    ) -> Result<FxHashMap<String, usize>, GraphError> {
        let mut indices = FxHashMap::default();
        for (index, registration) in registrations.iter().enumerate() {
            let descriptor = &registration.descriptor;
            if !descriptor.has_valid_name() {
                return Err(GraphError::InvalidServiceName(descriptor.name.clone()));
            }

            if indices.insert(descriptor.name.clone(), index).is_some() {
                return Err(GraphError::DuplicateServiceName(descriptor.name.clone()));
            }
        }

        Ok(indices)
    }

    #[allow(clippy::type_complexity)]
    fn resolve_edges(
        registrations: &[ServiceRegistration],
        indices: &FxHashMap<String, usize>,
    ) -> Result<(Vec<Vec<usize>>, Vec<Vec<usize>>), GraphError> {
        let mut prerequisites = vec![Vec::new(); registrations.len()];
        let mut dependents = vec![Vec::new(); registrations.len()];

        for (index, registration) in registrations.iter().enumerate() {
            let descriptor = &registration.descriptor;
            for prerequisite in descriptor.prerequisites.iter().unique() {
                match indices.get(prerequisite) {
                    Some(&prerequisite_index) => {
                        prerequisites[index].push(prerequisite_index);
                        dependents[prerequisite_index].push(index);
                    }
                    None if descriptor.skip_if_prerequisite_missing => {
                        debug!(
                            service = descriptor.name.as_str(),
                            prerequisite = prerequisite.as_str(),
                            "Ignoring missing prerequisite"
                        );
                    }
                    None => {
                        return Err(GraphError::UnknownPrerequisite {
                            service: descriptor.name.clone(),
                            prerequisite: prerequisite.clone(),
                        })
                    }
                }
            }
        }

        Ok((prerequisites, dependents))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns a node with given name.
    pub fn node(&self, name: &str) -> Option<&Arc<ServiceNode>> {
        self.indices.get(name).map(|index| &self.nodes[*index])
    }

    /// Returns all nodes in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<ServiceNode>> {
        self.nodes.iter()
    }

    /// Returns nodes without prerequisites.
    pub fn roots(&self) -> impl Iterator<Item = &Arc<ServiceNode>> {
        self.nodes.iter().filter(|node| node.is_root())
    }

    /// Returns nodes without dependents.
    pub fn leaves(&self) -> impl Iterator<Item = &Arc<ServiceNode>> {
        self.nodes.iter().filter(|node| node.is_leaf())
    }

    pub fn prerequisites_of<'a>(
        &'a self,
        node: &'a ServiceNode,
    ) -> impl Iterator<Item = &'a Arc<ServiceNode>> + 'a {
        node.prerequisites()
            .iter()
            .filter_map(|link| self.node(link.name()))
    }

    pub fn dependents_of<'a>(
        &'a self,
        node: &'a ServiceNode,
    ) -> impl Iterator<Item = &'a Arc<ServiceNode>> + 'a {
        node.dependents()
            .iter()
            .filter_map(|link| self.node(link.name()))
    }

    /// Returns the instance of a named service, if it's of the given type.
    pub fn instance<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.node(name).and_then(|node| node.instance::<T>())
    }

    /// Returns service names in an order in which they could be started sequentially. Ties are
    /// broken by registration order.
    pub fn topological_order(&self) -> Vec<&str> {
        let mut remaining = self
            .nodes
            .iter()
            .map(|node| node.prerequisites().len())
            .collect_vec();

        let mut ready = remaining
            .iter()
            .positions(|count| *count == 0)
            .collect::<VecDeque<_>>();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(index) = ready.pop_front() {
            let node = &self.nodes[index];
            order.push(node.name());

            for dependent in node.dependents() {
                if let Some(&dependent_index) = self.indices.get(dependent.name()) {
                    remaining[dependent_index] -= 1;
                    if remaining[dependent_index] == 0 {
                        ready.push_back(dependent_index);
                    }
                }
            }
        }

        order
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Visiting,
    Done,
}

// returns the indices forming a cycle, with the first one repeated at the end
fn find_cycle(prerequisites: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut marks = vec![Mark::New; prerequisites.len()];

    for start in 0..prerequisites.len() {
        if marks[start] != Mark::New {
            continue;
        }

        // current path, with the position of the next prerequisite to visit for each entry
        let mut path = vec![(start, 0)];
        marks[start] = Mark::Visiting;

        while let Some((index, position)) = path.last_mut() {
            let index = *index;
            match prerequisites[index].get(*position) {
                Some(&next) => {
                    *position += 1;
                    match marks[next] {
                        Mark::New => {
                            marks[next] = Mark::Visiting;
                            path.push((next, 0));
                        }
                        Mark::Visiting => {
                            let mut cycle = path
                                .iter()
                                .map(|(visited, _)| *visited)
                                .skip_while(|visited| *visited != next)
                                .collect_vec();
                            cycle.push(next);
                            return Some(cycle);
                        }
                        Mark::Done => {}
                    }
                }
                None => {
                    marks[index] = Mark::Done;
                    path.pop();
                }
            }
        }
    }

    None
}
