//! Expansion of a generation config into chat requests.

use crate::client::ChatRequest;
use crate::functions::Intent;
use crate::models::{GenerationConfig, Message, Variable};
use crate::pipeline::interpolate;

/// Let the model decide whether to call one of the offered functions.
pub const FUNCTION_CALL_AUTO: &str = "auto";

/// Build `topics.len() * count` requests.
///
/// All repeats of topic `i` precede those of topic `i + 1`, so request `n`
/// maps back to topic `n / count`.
pub fn build_requests(config: &GenerationConfig) -> Vec<ChatRequest> {
    let functions = Intent::definitions();
    let mut requests = Vec::with_capacity(config.topics.len() * config.count);

    for topic in &config.topics {
        let mut variables = config.variables.clone();
        variables.insert("topic".to_string(), Variable::Text(topic.clone()));
        let prompt = interpolate(&config.template, &variables);

        for _ in 0..config.count {
            requests.push(ChatRequest {
                model: config.model.clone(),
                messages: vec![Message::system(&config.system), Message::user(&prompt)],
                temperature: config.temperature,
                functions: functions.clone(),
                function_call: Some(FUNCTION_CALL_AUTO.to_string()),
                stream: false,
            });
        }
    }

    requests
}

/// Topic a request index belongs to.
pub fn topic_for(config: &GenerationConfig, index: usize) -> Option<&str> {
    config
        .topics
        .get(index / config.count.max(1))
        .map(String::as_str)
}
