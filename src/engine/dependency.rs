// ABOUTME: Job dependency graph and execution planning
// ABOUTME: Orders jobs with Kahn's algorithm using a lexicographic tie-break

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::{Direction, Graph};
use std::collections::{BTreeSet, HashMap};

use super::error::GraphError;
use super::state::{ExecutionState, Status};
use crate::parser::Workflow;

pub struct DependencyGraph {
    graph: Graph<String, ()>,
    job_indices: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Create a dependency graph from a workflow
    pub fn from_workflow(workflow: &Workflow) -> Result<Self, GraphError> {
        if workflow.jobs.is_empty() {
            return Err(GraphError::EmptyWorkflow);
        }

        let mut graph = Graph::new();
        let mut job_indices = HashMap::new();

        for job_id in workflow.jobs.keys() {
            let node_index = graph.add_node(job_id.clone());
            job_indices.insert(job_id.clone(), node_index);
        }

        // Edge from dependency to dependent
        for (job_id, job) in &workflow.jobs {
            let job_node = job_indices[job_id];

            for dependency in &job.needs {
                match job_indices.get(dependency) {
                    Some(&dep_node) => {
                        graph.add_edge(dep_node, job_node, ());
                    }
                    None => {
                        return Err(GraphError::UnknownDependency {
                            job: job_id.clone(),
                            dependency: dependency.clone(),
                        })
                    }
                }
            }
        }

        Ok(Self { graph, job_indices })
    }

    /// Total execution order. Among jobs that become eligible at the same
    /// time, the lexicographically smallest id runs first.
    pub fn execution_order(&self) -> Result<Vec<String>, GraphError> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|node| {
                let degree = self
                    .graph
                    .edges_directed(node, Direction::Incoming)
                    .count();
                (node, degree)
            })
            .collect();

        let mut ready: BTreeSet<(&str, NodeIndex)> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&node, _)| (self.graph[node].as_str(), node))
            .collect();

        let mut order = Vec::with_capacity(self.job_indices.len());

        while let Some((job_id, node)) = ready.pop_first() {
            order.push(job_id.to_string());

            for edge_target in self
                .graph
                .edges_directed(node, Direction::Outgoing)
                .map(|edge| edge.target())
            {
                if let Some(degree) = in_degree.get_mut(&edge_target) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert((self.graph[edge_target].as_str(), edge_target));
                    }
                }
            }
        }

        if order.len() < self.job_indices.len() {
            let mut jobs: Vec<String> = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(node, _)| self.graph[node].clone())
                .collect();
            jobs.sort();
            return Err(GraphError::CircularDependency { jobs });
        }

        Ok(order)
    }

    /// Pending jobs whose dependencies have all succeeded, sorted
    pub fn ready_jobs(&self, state: &ExecutionState) -> Vec<String> {
        let mut ready: Vec<String> = self
            .job_indices
            .iter()
            .filter(|(job_id, _)| state.job_status(job_id) == Some(Status::Pending))
            .filter(|&(_, &node)| {
                self.graph
                    .neighbors_directed(node, Direction::Incoming)
                    .all(|dep| state.job_status(&self.graph[dep]) == Some(Status::Success))
            })
            .map(|(job_id, _)| job_id.clone())
            .collect();
        ready.sort();
        ready
    }

    /// Get all jobs that depend on the given job
    pub fn dependents(&self, job_id: &str) -> Vec<String> {
        self.neighbors(job_id, Direction::Outgoing)
    }

    /// Get all jobs that the given job depends on
    pub fn dependencies(&self, job_id: &str) -> Vec<String> {
        self.neighbors(job_id, Direction::Incoming)
    }

    fn neighbors(&self, job_id: &str, direction: Direction) -> Vec<String> {
        let mut jobs: Vec<String> = match self.job_indices.get(job_id) {
            Some(&node) => self
                .graph
                .neighbors_directed(node, direction)
                .map(|n| self.graph[n].clone())
                .collect(),
            None => Vec::new(),
        };
        jobs.sort();
        jobs.dedup();
        jobs
    }

    /// Get jobs that have no dependencies, sorted
    pub fn root_jobs(&self) -> Vec<String> {
        let mut roots: Vec<String> = self
            .job_indices
            .iter()
            .filter(|&(_, &node)| {
                self.graph
                    .neighbors_directed(node, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|(job_id, _)| job_id.clone())
            .collect();
        roots.sort();
        roots
    }
}

/// Validate references and produce the job execution order
pub fn build_execution_plan(workflow: &Workflow) -> Result<Vec<String>, GraphError> {
    DependencyGraph::from_workflow(workflow)?.execution_order()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Job;
    use indexmap::IndexMap;
    use std::collections::BTreeMap;

    /// Jobs as (id, comma-separated needs)
    fn workflow(jobs: &[(&str, &str)]) -> Workflow {
        let jobs: IndexMap<String, Job> = jobs
            .iter()
            .map(|(id, needs)| {
                (
                    id.to_string(),
                    Job {
                        runs_on: "ubuntu-latest".to_string(),
                        needs: needs
                            .split(',')
                            .filter(|n| !n.is_empty())
                            .map(str::to_string)
                            .collect(),
                        ..Default::default()
                    },
                )
            })
            .collect();

        Workflow {
            name: "test".to_string(),
            on: None,
            env: BTreeMap::new(),
            jobs,
        }
    }

    #[test]
    fn test_linear_chain_order() {
        let wf = workflow(&[("deploy", "test"), ("test", "build"), ("build", "")]);
        assert_eq!(
            build_execution_plan(&wf).unwrap(),
            vec!["build", "test", "deploy"]
        );
    }

    #[test]
    fn test_independent_jobs_sorted_lexicographically() {
        let wf = workflow(&[("b", ""), ("a", "")]);
        assert_eq!(build_execution_plan(&wf).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_diamond_order_is_deterministic() {
        let wf = workflow(&[
            ("z_final", "lint,compile"),
            ("lint", "setup"),
            ("compile", "setup"),
            ("setup", ""),
        ]);
        assert_eq!(
            build_execution_plan(&wf).unwrap(),
            vec!["setup", "compile", "lint", "z_final"]
        );
    }

    #[test]
    fn test_newly_ready_job_competes_with_waiting_ones() {
        // "a" unlocks "b"; "b" sorts before "c" which was ready from the start
        let wf = workflow(&[("c", ""), ("b", "a"), ("a", "")]);
        assert_eq!(build_execution_plan(&wf).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let wf = workflow(&[("a", "b"), ("b", "a"), ("c", "")]);
        assert_eq!(
            build_execution_plan(&wf),
            Err(GraphError::CircularDependency {
                jobs: vec!["a".to_string(), "b".to_string()]
            })
        );
    }

    #[test]
    fn test_cycle_report_includes_blocked_dependents() {
        let wf = workflow(&[("a", "b"), ("b", "a"), ("d", "a")]);
        match build_execution_plan(&wf) {
            Err(GraphError::CircularDependency { jobs }) => {
                assert_eq!(jobs, vec!["a", "b", "d"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let wf = workflow(&[("a", "a")]);
        assert!(matches!(
            build_execution_plan(&wf),
            Err(GraphError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency() {
        let wf = workflow(&[("a", "x")]);
        assert_eq!(
            build_execution_plan(&wf),
            Err(GraphError::UnknownDependency {
                job: "a".to_string(),
                dependency: "x".to_string()
            })
        );
    }

    #[test]
    fn test_empty_workflow() {
        let wf = workflow(&[]);
        assert_eq!(build_execution_plan(&wf), Err(GraphError::EmptyWorkflow));
    }

    #[test]
    fn test_ready_jobs_follow_state() {
        let wf = workflow(&[("build", ""), ("lint", ""), ("test", "build,lint")]);
        let graph = DependencyGraph::from_workflow(&wf).unwrap();
        let order = graph.execution_order().unwrap();
        let mut state = ExecutionState::new(&wf, &order);

        assert_eq!(graph.ready_jobs(&state), vec!["build", "lint"]);

        state.start_job("build");
        state.finish_job("build", Status::Success, None);
        assert_eq!(graph.ready_jobs(&state), vec!["lint"]);

        state.start_job("lint");
        state.finish_job("lint", Status::Success, None);
        assert_eq!(graph.ready_jobs(&state), vec!["test"]);
    }

    #[test]
    fn test_ready_jobs_exclude_dependents_of_failures() {
        let wf = workflow(&[("build", ""), ("test", "build")]);
        let graph = DependencyGraph::from_workflow(&wf).unwrap();
        let order = graph.execution_order().unwrap();
        let mut state = ExecutionState::new(&wf, &order);

        state.start_job("build");
        state.finish_job("build", Status::Failure, Some("boom".to_string()));
        assert!(graph.ready_jobs(&state).is_empty());
    }

    #[test]
    fn test_dependency_queries() {
        let wf = workflow(&[("build", ""), ("lint", ""), ("test", "build,lint")]);
        let graph = DependencyGraph::from_workflow(&wf).unwrap();

        assert_eq!(graph.dependencies("test"), vec!["build", "lint"]);
        assert_eq!(graph.dependents("build"), vec!["test"]);
        assert_eq!(graph.root_jobs(), vec!["build", "lint"]);
        assert!(graph.dependencies("missing").is_empty());
    }
}
