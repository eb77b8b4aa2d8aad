//! Upstream graph between schedulers.

use cascade_core::ConfigError;
use cascade_core::config::SchedulerSpec;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Directed acyclic graph of schedulers, edges pointing upstream -> downstream.
#[derive(Debug, Clone)]
pub struct UpstreamGraph {
    graph: DiGraph<String, ()>,
    name_to_index: HashMap<String, NodeIndex>,
    /// Position of each scheduler in a topological order.
    rank: HashMap<String, usize>,
}

impl UpstreamGraph {
    /// Build the graph and reject unknown references and cycles.
    pub fn build(specs: &[SchedulerSpec]) -> Result<Self, ConfigError> {
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for spec in specs {
            let idx = graph.add_node(spec.name.clone());
            name_to_index.insert(spec.name.clone(), idx);
        }

        for spec in specs {
            let idx = name_to_index[&spec.name];
            for upstream in &spec.upstreams {
                let up_idx = name_to_index.get(upstream).ok_or_else(|| {
                    ConfigError::UnknownUpstream {
                        scheduler: spec.name.clone(),
                        upstream: upstream.clone(),
                    }
                })?;
                graph.update_edge(*up_idx, idx, ());
            }
        }

        let order = toposort(&graph, None).map_err(|_| Self::cycle_error(&graph))?;
        let rank = order
            .iter()
            .enumerate()
            .map(|(pos, &idx)| (graph[idx].clone(), pos))
            .collect();

        Ok(Self {
            graph,
            name_to_index,
            rank,
        })
    }

    /// Name every scheduler that sits on a cycle, including self-loops.
    fn cycle_error(graph: &DiGraph<String, ()>) -> ConfigError {
        let mut schedulers: Vec<String> = tarjan_scc(graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .flatten()
            .map(|idx| graph[idx].clone())
            .collect();
        schedulers.sort();
        ConfigError::DependencyCycle { schedulers }
    }

    /// Direct upstreams of a scheduler.
    pub fn upstreams(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, petgraph::Direction::Incoming)
    }

    /// Schedulers gated on this one.
    pub fn downstreams(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, petgraph::Direction::Outgoing)
    }

    fn neighbors(&self, name: &str, direction: petgraph::Direction) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .name_to_index
            .get(name)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, direction)
                    .map(|n| self.graph[n].as_str())
                    .collect()
            })
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    /// Schedulers without upstreams.
    pub fn roots(&self) -> Vec<&str> {
        let mut roots: Vec<&str> = self
            .graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|idx| self.graph[idx].as_str())
            .collect();
        roots.sort_unstable();
        roots
    }

    /// All schedulers, every upstream before its downstreams.
    pub fn topological_order(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rank.keys().map(String::as_str).collect();
        names.sort_by_key(|name| self.rank[*name]);
        names
    }

    /// Topological rank, used to order dispatches within one tick.
    pub fn rank(&self, name: &str) -> usize {
        self.rank.get(name).copied().unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::config::{FilterSpec, WaitPolicy};

    fn spec(name: &str, upstreams: &[&str]) -> SchedulerSpec {
        SchedulerSpec::new(name, FilterSpec::tag("llvm"), [format!("{name}-builder")])
            .upstreams(upstreams.iter().copied(), WaitPolicy::All)
    }

    #[test]
    fn test_linear_chain() {
        let graph = UpstreamGraph::build(&[
            spec("s_test-llvm", &["s_llvm"]),
            spec("s_llvm", &[]),
            spec("s_bootstrap", &["s_test-llvm"]),
        ])
        .unwrap();

        assert_eq!(graph.roots(), vec!["s_llvm"]);
        assert_eq!(
            graph.topological_order(),
            vec!["s_llvm", "s_test-llvm", "s_bootstrap"]
        );
        assert!(graph.rank("s_llvm") < graph.rank("s_bootstrap"));
    }

    #[test]
    fn test_fan_in() {
        let graph = UpstreamGraph::build(&[
            spec("s_llvm", &[]),
            spec("s_clang", &["s_llvm"]),
            spec("s_tools", &["s_llvm", "s_clang"]),
        ])
        .unwrap();

        assert_eq!(graph.upstreams("s_tools"), vec!["s_clang", "s_llvm"]);
        assert_eq!(graph.downstreams("s_llvm"), vec!["s_clang", "s_tools"]);
        assert!(graph.upstreams("s_unknown").is_empty());
    }

    #[test]
    fn test_unknown_upstream() {
        let err = UpstreamGraph::build(&[spec("s_clang", &["s_llvm"])]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownUpstream {
                scheduler: "s_clang".to_string(),
                upstream: "s_llvm".to_string(),
            }
        );
    }

    #[test]
    fn test_two_node_cycle() {
        let err = UpstreamGraph::build(&[spec("A", &["B"]), spec("B", &["A"])]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::DependencyCycle {
                schedulers: vec!["A".to_string(), "B".to_string()],
            }
        );
    }

    #[test]
    fn test_cycle_reports_only_members() {
        let err = UpstreamGraph::build(&[
            spec("s_root", &[]),
            spec("s_a", &["s_root", "s_c"]),
            spec("s_b", &["s_a"]),
            spec("s_c", &["s_b"]),
            spec("s_leaf", &["s_c"]),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DependencyCycle {
                schedulers: vec!["s_a".to_string(), "s_b".to_string(), "s_c".to_string()],
            }
        );
    }

    #[test]
    fn test_self_dependency() {
        let err = UpstreamGraph::build(&[spec("s_self", &["s_self"])]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::DependencyCycle {
                schedulers: vec!["s_self".to_string()],
            }
        );
    }
}
