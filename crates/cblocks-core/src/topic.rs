//! Resource topic codec.
//!
//! Serializes resource addresses and correlation identifiers into
//! publish/subscribe topic strings:
//!
//! | Channel | Layout |
//! |---------|--------|
//! | output | `{objectID}/{instanceID}/{resourceID}/output` |
//! | input | `{clientID}/{objectID}/{instanceID}/{resourceID}/input` |
//! | errors | `{objectID}/{instanceID}/{resourceID}/output/errors` |
//! | responses | `{clientID}/responses` |
//!
//! Decoding a resource topic ignores any leading namespace segment, so the
//! client ID of an input topic is discarded. Client IDs are only ever read
//! from response topics.

use crate::error::{Error, Result};
use crate::resource::{InstanceId, ObjectId, ResourceAddress, ResourceId};

const OUTPUT_SUFFIX: &str = "output";
const INPUT_SUFFIX: &str = "input";
const ERRORS_SUFFIX: &str = "/errors";
const RESPONSES_SUFFIX: &str = "/responses";

/// Topic on which a device publishes a resource's current value.
pub fn resource_output_topic(
    object_id: ObjectId,
    instance_id: InstanceId,
    resource_id: ResourceId,
) -> String {
    format!("{}/{}/{}/{}", object_id, instance_id, resource_id, OUTPUT_SUFFIX)
}

/// Topic on which `client_id` publishes a write command.
pub fn resource_input_topic(
    client_id: &str,
    object_id: ObjectId,
    instance_id: InstanceId,
    resource_id: ResourceId,
) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        client_id, object_id, instance_id, resource_id, INPUT_SUFFIX
    )
}

/// Topic on which a device reports a failed write.
pub fn publish_error_topic(
    object_id: ObjectId,
    instance_id: InstanceId,
    resource_id: ResourceId,
) -> String {
    resource_output_topic(object_id, instance_id, resource_id) + ERRORS_SUFFIX
}

/// Topic on which devices answer `client_id` directly.
pub fn response_topic(client_id: &str) -> String {
    format!("{}{}", client_id, RESPONSES_SUFFIX)
}

/// Decode the resource address from an output or input topic.
///
/// Exactly three numeric segments must precede the `output`/`input` suffix.
/// At most one leading namespace segment is accepted and ignored.
pub fn decompose_resource_topic(topic: &str) -> Result<ResourceAddress> {
    let invalid = || Error::InvalidTopicFormat(topic.to_string());

    let segments: Vec<&str> = topic.split('/').collect();
    if segments.len() != 4 && segments.len() != 5 {
        return Err(invalid());
    }

    let (suffix, ids) = segments.split_last().ok_or_else(invalid)?;
    if *suffix != OUTPUT_SUFFIX && *suffix != INPUT_SUFFIX {
        return Err(invalid());
    }

    let ids = &ids[ids.len() - 3..];
    let parse = |s: &str| {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        s.parse::<u32>().map_err(|_| invalid())
    };

    Ok(ResourceAddress::new(
        parse(ids[0])?,
        parse(ids[1])?,
        parse(ids[2])?,
    ))
}

/// Extract the client ID from a `{clientID}/responses` topic.
pub fn client_id_from_response_topic(topic: &str) -> Result<String> {
    match topic.strip_suffix(RESPONSES_SUFFIX) {
        Some(client_id) if !client_id.is_empty() && !client_id.contains('/') => {
            Ok(client_id.to_string())
        }
        _ => Err(Error::InvalidTopicFormat(topic.to_string())),
    }
}

/// Classified inbound topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundTopic {
    /// A device published a resource value.
    Output(ResourceAddress),
    /// A device reported an error for a resource.
    Error(ResourceAddress),
    /// A device answered a client directly.
    Response(String),
}

/// Classify a topic received from the broker.
pub fn classify(topic: &str) -> Result<InboundTopic> {
    if let Some(output) = topic.strip_suffix(ERRORS_SUFFIX) {
        if output.ends_with(OUTPUT_SUFFIX) {
            return decompose_resource_topic(output).map(InboundTopic::Error);
        }
    }
    if topic.ends_with(RESPONSES_SUFFIX) {
        return client_id_from_response_topic(topic).map(InboundTopic::Response);
    }
    if topic.ends_with(OUTPUT_SUFFIX) {
        return decompose_resource_topic(topic).map(InboundTopic::Output);
    }
    Err(Error::InvalidTopicFormat(topic.to_string()))
}

/// Match a topic against a subscription filter with `+` and `#` wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_topics() {
        assert_eq!(resource_output_topic(3303, 0, 1), "3303/0/1/output");
        assert_eq!(
            resource_input_topic("client-7", 3303, 0, 1),
            "client-7/3303/0/1/input"
        );
        assert_eq!(publish_error_topic(3303, 0, 1), "3303/0/1/output/errors");
        assert_eq!(response_topic("abc123"), "abc123/responses");
    }

    #[test]
    fn test_decompose_output_topic() {
        let address = decompose_resource_topic("17/2/1/output").unwrap();
        assert_eq!(address, ResourceAddress::new(17, 2, 1));
    }

    #[test]
    fn test_decompose_ignores_namespace() {
        let address = decompose_resource_topic("client-7/3304/1/0/input").unwrap();
        assert_eq!(address, ResourceAddress::new(3304, 1, 0));
    }

    #[test]
    fn test_decompose_rejects_malformed() {
        for topic in [
            "bogus",
            "17/2/output",
            "17/2/x/output",
            "17/2/1/state",
            "17/2/-1/output",
            "a/b/17/2/1/output",
        ] {
            let err = decompose_resource_topic(topic).unwrap_err();
            assert!(matches!(err, Error::InvalidTopicFormat(_)), "{}", topic);
        }
    }

    #[test]
    fn test_decompose_rejects_signed_segments() {
        assert!(decompose_resource_topic("3303/+0/0/output").is_err());
        assert!(decompose_resource_topic("+3303/0/0/output").is_err());
        assert!(decompose_resource_topic("client/3303/0/-1/input").is_err());
    }

    #[test]
    fn test_client_id_from_response_topic() {
        assert_eq!(
            client_id_from_response_topic("abc123/responses").unwrap(),
            "abc123"
        );
        assert!(client_id_from_response_topic("abc123/requests").is_err());
        assert!(client_id_from_response_topic("/responses").is_err());
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify("3303/0/0/output").unwrap(),
            InboundTopic::Output(ResourceAddress::new(3303, 0, 0))
        );
        assert_eq!(
            classify("3303/0/0/output/errors").unwrap(),
            InboundTopic::Error(ResourceAddress::new(3303, 0, 0))
        );
        assert_eq!(
            classify("abc/responses").unwrap(),
            InboundTopic::Response("abc".to_string())
        );
        assert!(classify("abc/0/0/0/input").is_err());
    }

    #[test]
    fn test_topic_matches() {
        assert!(topic_matches("3303/0/0/output", "3303/0/0/output"));
        assert!(topic_matches("+/+/+/output", "3303/0/0/output"));
        assert!(topic_matches("3303/#", "3303/0/0/output/errors"));
        assert!(!topic_matches("+/+/+/output", "3303/0/0/output/errors"));
        assert!(!topic_matches("3303/0/0/output/errors", "3303/0/0/output"));
    }
}
