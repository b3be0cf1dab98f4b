use agent_client::AgentClient;
use rand::Rng;
use refactor_client::entities::container_name;

use crate::config::core_config;

pub mod query;
pub mod workspace;

pub fn random_string(length: usize) -> String {
  rand::rng()
    .sample_iter(&rand::distr::Alphanumeric)
    .take(length)
    .map(char::from)
    .collect()
}

/// Client for the agent inside the project's container, addressed by
/// canonical container name over the shared container network.
pub fn agent(project_id: &str) -> AgentClient {
  AgentClient::new(format!(
    "http://{}:{}",
    container_name(project_id),
    core_config().agent_port
  ))
}
