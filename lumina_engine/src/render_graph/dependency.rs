/// Pass dependency construction and topological scheduling.
///
/// Pass A depends on pass B (A != B) iff A reads a resource name B writes.
/// The schedule is Kahn's algorithm seeded and drained in registration
/// order, so the same pass set always produces the same order.

use std::collections::VecDeque;
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::engine_error;
use super::pass::{PassDescriptor, PassId};

/// Directed edge: `consumer` depends on `producer`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    pub producer: PassId,
    pub consumer: PassId,
}

pub struct DependencyGraph {
    /// Passes in registration order
    passes: Vec<PassDescriptor>,
    /// Pass -> passes it depends on (registration order)
    dependencies: FxHashMap<PassId, Vec<PassId>>,
    /// Pass -> passes depending on it (registration order)
    dependents: FxHashMap<PassId, Vec<PassId>>,
}

impl DependencyGraph {
    /// Build the adjacency map over every ordered pair of passes
    pub fn build(passes: &[PassDescriptor]) -> Self {
        let mut dependencies: FxHashMap<PassId, Vec<PassId>> = FxHashMap::default();
        let mut dependents: FxHashMap<PassId, Vec<PassId>> = FxHashMap::default();

        for consumer in passes {
            dependencies.entry(consumer.id).or_default();
            dependents.entry(consumer.id).or_default();
        }

        for consumer in passes {
            for producer in passes {
                if consumer.id == producer.id {
                    continue;
                }
                let reads_output = consumer
                    .dependencies
                    .reads()
                    .iter()
                    .any(|name| producer.dependencies.is_written(name));
                if reads_output {
                    dependencies.entry(consumer.id).or_default().push(producer.id);
                    dependents.entry(producer.id).or_default().push(consumer.id);
                }
            }
        }

        // dependents were filled consumer-major; restore registration order
        let position: FxHashMap<PassId, usize> = passes.iter().enumerate().map(|(i, p)| (p.id, i)).collect();
        for list in dependents.values_mut() {
            list.sort_by_key(|id| position[id]);
        }

        Self { passes: passes.to_vec(), dependencies, dependents }
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Passes `pass` depends on
    pub fn dependencies_of(&self, pass: PassId) -> &[PassId] {
        self.dependencies.get(&pass).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Passes depending on `pass`
    pub fn dependents_of(&self, pass: PassId) -> &[PassId] {
        self.dependents.get(&pass).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn depends_on(&self, consumer: PassId, producer: PassId) -> bool {
        self.dependencies_of(consumer).contains(&producer)
    }

    /// Every edge, consumers in registration order
    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.passes
            .iter()
            .flat_map(|consumer| {
                self.dependencies_of(consumer.id)
                    .iter()
                    .map(move |producer| DependencyEdge { producer: *producer, consumer: consumer.id })
            })
            .collect()
    }

    /// Passes nothing depends on
    pub fn sinks(&self) -> Vec<PassId> {
        self.passes
            .iter()
            .filter(|p| self.dependents_of(p.id).is_empty())
            .map(|p| p.id)
            .collect()
    }

    pub fn descriptor(&self, pass: PassId) -> Option<&PassDescriptor> {
        self.passes.iter().find(|p| p.id == pass)
    }

    /// Kahn's algorithm.
    ///
    /// Fails with `CyclicDependency` naming the passes that could not be
    /// scheduled.
    pub fn topological_order(&self) -> Result<Vec<PassId>> {
        let mut in_degree: FxHashMap<PassId, usize> = self
            .passes
            .iter()
            .map(|p| (p.id, self.dependencies_of(p.id).len()))
            .collect();

        let mut queue: VecDeque<PassId> = self
            .passes
            .iter()
            .filter(|p| in_degree[&p.id] == 0)
            .map(|p| p.id)
            .collect();

        let mut order = Vec::with_capacity(self.passes.len());
        while let Some(pass) = queue.pop_front() {
            order.push(pass);
            for dependent in self.dependents_of(pass) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }

        if order.len() != self.passes.len() {
            let remaining: Vec<String> = self
                .passes
                .iter()
                .filter(|p| !order.contains(&p.id))
                .map(|p| p.name.clone())
                .collect();
            engine_error!("lumina::RenderGraph", "Cyclic pass dependency between: {}", remaining.join(", "));
            return Err(Error::CyclicDependency(remaining));
        }
        Ok(order)
    }
}

#[cfg(test)]
#[path = "dependency_tests.rs"]
mod tests;
