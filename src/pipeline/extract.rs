//! Conversion of chat completions into training records.
//!
//! A completion yields a record only if its first choice carries a function
//! call that decodes into a known [`Intent`]. Anything else is dropped with a
//! warning; a miss never aborts the run.

use crate::client::ChatCompletion;
use crate::functions::{CONVERT_TO_TRAINING_DATA, Intent};
use crate::models::{GenerationConfig, Message, TrainingRecord};
use crate::pipeline::topic_for;
use tracing::warn;

/// Why a completion produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Miss {
    NoChoices,
    NoFunctionCall,
    Undecodable(String),
}

/// Outcome of extracting a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub records: Vec<TrainingRecord>,
    pub dropped: usize,
}

/// Extract one record, prepending the system prompt.
pub fn extract_record(completion: &ChatCompletion, system: &str) -> Result<TrainingRecord, Miss> {
    let choice = completion.choices.first().ok_or(Miss::NoChoices)?;
    let call = choice
        .message
        .function_call
        .as_ref()
        .ok_or(Miss::NoFunctionCall)?;
    let intent = Intent::from_call(call).map_err(|e| Miss::Undecodable(e.to_string()))?;

    let mut messages = vec![Message::system(system)];
    messages.extend(intent.into_messages());
    Ok(TrainingRecord { messages })
}

/// Extract records from every completion, in request order.
///
/// `completions[i]` answers request `i` of [`build_requests`](crate::pipeline::build_requests),
/// so misses are logged with the topic that produced them.
pub fn extract_records(completions: &[ChatCompletion], config: &GenerationConfig) -> Extraction {
    let mut extraction = Extraction::default();

    for (index, completion) in completions.iter().enumerate() {
        match extract_record(completion, &config.system) {
            Ok(record) => extraction.records.push(record),
            Err(miss) => {
                extraction.dropped += 1;
                let topic = topic_for(config, index).unwrap_or_default();
                match miss {
                    Miss::NoChoices => warn!(
                        index = index,
                        topic = %topic,
                        completion_id = %completion.id,
                        "Ignoring generated data response with no choices"
                    ),
                    Miss::NoFunctionCall => warn!(
                        index = index,
                        topic = %topic,
                        completion_id = %completion.id,
                        "Ignoring generated data response due to missing function_call \"{}\"",
                        CONVERT_TO_TRAINING_DATA
                    ),
                    Miss::Undecodable(reason) => warn!(
                        index = index,
                        topic = %topic,
                        completion_id = %completion.id,
                        reason = %reason,
                        "Ignoring generated data response with an unusable function_call"
                    ),
                }
            }
        }
    }

    extraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AssistantMessage, Choice, FunctionCall};
    use std::collections::BTreeMap;

    fn generation(topics: &[&str], count: usize) -> GenerationConfig {
        GenerationConfig {
            model: "gpt-3.5-turbo".to_string(),
            system: "S".to_string(),
            template: "Discuss {{topic}}".to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            count,
            variables: BTreeMap::new(),
            temperature: 1.0,
            batch_size: 2,
        }
    }

    fn completion(message: AssistantMessage) -> ChatCompletion {
        ChatCompletion {
            id: "c".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            created: None,
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason: None,
                extra: Default::default(),
            }],
            usage: None,
            extra: Default::default(),
        }
    }

    fn with_call(arguments: &str) -> ChatCompletion {
        completion(AssistantMessage {
            role: Some("assistant".to_string()),
            content: None,
            function_call: Some(FunctionCall {
                name: CONVERT_TO_TRAINING_DATA.to_string(),
                arguments: arguments.to_string(),
            }),
            extra: Default::default(),
        })
    }

    #[test]
    fn test_function_call_becomes_record() {
        let record = extract_record(
            &with_call(r#"{"conversation":[{"role":"user","content":"hi"}]}"#),
            "S",
        )
        .unwrap();
        assert_eq!(
            record,
            TrainingRecord {
                messages: vec![Message::system("S"), Message::user("hi")],
            }
        );
    }

    #[test]
    fn test_plain_text_is_dropped() {
        let text = completion(AssistantMessage {
            role: Some("assistant".to_string()),
            content: Some("just text".to_string()),
            function_call: None,
            extra: Default::default(),
        });
        assert_eq!(extract_record(&text, "S"), Err(Miss::NoFunctionCall));

        let extraction = extract_records(
            &[
                text,
                with_call(r#"{"conversation":[{"role":"user","content":"hi"}]}"#),
            ],
            &generation(&["A", "B"], 1),
        );
        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.dropped, 1);
        assert_eq!(extraction.records[0].messages[0], Message::system("S"));
    }

    #[test]
    fn test_malformed_arguments_are_dropped() {
        let extraction = extract_records(&[with_call("{not json")], &generation(&["A"], 1));
        assert!(extraction.records.is_empty());
        assert_eq!(extraction.dropped, 1);
    }

    #[test]
    fn test_empty_choices_are_dropped() {
        let mut empty = with_call("{}");
        empty.choices.clear();
        assert_eq!(extract_record(&empty, "S"), Err(Miss::NoChoices));
    }

    #[test]
    fn test_misses_past_the_last_topic_still_count() {
        // More completions than requests: the extra one has no topic
        let config = generation(&["A"], 1);
        let extraction = extract_records(&[with_call("{}"), with_call("{}")], &config);
        assert_eq!(extraction.dropped, 2);
        assert_eq!(topic_for(&config, 1), None);
    }
}
