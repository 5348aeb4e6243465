//! Encoding of objects, lists, watch frames and `Status` bodies.
//!
//! Lists are written in the API server's list shape (`apiVersion`, `kind:
//! <Kind>List`, `metadata`, `items`) without copying the cached objects.
//! JSON watch frames are newline-delimited `{"type": ..., "object": ...}`
//! documents; YAML watch frames are `---` separated.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ListMeta, Status, StatusDetails};
use k8s_openapi::ListableResource;
use serde::Serialize;
use wrapper_core::{EventType, WrapperError};

use crate::negotiate::MediaType;

#[derive(Serialize)]
struct ListBody<'a, T> {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    kind: &'static str,
    metadata: ListMeta,
    items: Vec<&'a T>,
}

#[derive(Serialize)]
struct WatchFrame<'a, T> {
    #[serde(rename = "type")]
    kind: &'static str,
    object: &'a T,
}

fn to_bytes<T: Serialize>(media: MediaType, value: &T) -> Result<Vec<u8>, WrapperError> {
    match media {
        MediaType::Json => {
            serde_json::to_vec(value).map_err(|e| WrapperError::encoding(media.content_type(), e))
        }
        MediaType::Yaml => serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| WrapperError::encoding(media.content_type(), e)),
    }
}

/// Encode a single object.
pub fn encode_object<T: Serialize>(media: MediaType, object: &T) -> Result<Bytes, WrapperError> {
    to_bytes(media, object).map(Bytes::from)
}

/// Encode a list of cached objects.
pub fn encode_list<T>(media: MediaType, items: &[Arc<T>]) -> Result<Bytes, WrapperError>
where
    T: ListableResource + Serialize,
{
    let body = ListBody {
        api_version: T::API_VERSION,
        kind: T::LIST_KIND,
        metadata: ListMeta::default(),
        items: items.iter().map(AsRef::as_ref).collect(),
    };
    encode_object(media, &body)
}

/// Append one watch frame to `buf`.
pub fn encode_watch_event<T: Serialize>(
    media: MediaType,
    kind: EventType,
    object: &T,
    buf: &mut BytesMut,
) -> Result<(), WrapperError> {
    let frame = WatchFrame {
        kind: kind.as_str(),
        object,
    };
    let encoded = to_bytes(media, &frame)?;
    match media {
        MediaType::Json => {
            buf.extend_from_slice(&encoded);
            buf.put_u8(b'\n');
        }
        MediaType::Yaml => {
            buf.extend_from_slice(b"---\n");
            buf.extend_from_slice(&encoded);
        }
    }
    Ok(())
}

/// Build the `Status` object describing an error.
pub fn status_for(error: &WrapperError) -> Status {
    let details = match error {
        WrapperError::NotFound { kind, name } => Some(StatusDetails {
            kind: Some(kind.clone()),
            name: Some(name.clone()),
            ..Default::default()
        }),
        _ => None,
    };

    Status {
        code: Some(i32::from(error.status_code().as_u16())),
        details,
        message: Some(error.to_string()),
        metadata: ListMeta::default(),
        reason: Some(error.reason().to_string()),
        status: Some("Failure".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Service;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn svc(name: &str) -> Arc<Service> {
        Arc::new(Service {
            metadata: ObjectMeta {
                namespace: Some("default".to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[test]
    fn test_list_shape() {
        let bytes = encode_list(MediaType::Json, &[svc("a"), svc("b")]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["apiVersion"], "v1");
        assert_eq!(value["kind"], "ServiceList");
        assert_eq!(value["items"].as_array().unwrap().len(), 2);
        assert_eq!(value["items"][0]["kind"], "Service");
        assert_eq!(value["items"][1]["metadata"]["name"], "b");
    }

    #[test]
    fn test_json_watch_frames_are_lines() {
        let mut buf = BytesMut::new();
        encode_watch_event(MediaType::Json, EventType::Added, svc("a").as_ref(), &mut buf).unwrap();
        encode_watch_event(MediaType::Json, EventType::Deleted, svc("b").as_ref(), &mut buf)
            .unwrap();

        let text = std::str::from_utf8(&buf).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "ADDED");
        assert_eq!(lines[1]["type"], "DELETED");
        assert_eq!(lines[1]["object"]["metadata"]["name"], "b");
    }

    #[test]
    fn test_yaml_watch_frames_are_documents() {
        let mut buf = BytesMut::new();
        encode_watch_event(MediaType::Yaml, EventType::Modified, svc("a").as_ref(), &mut buf)
            .unwrap();
        let text = std::str::from_utf8(&buf).unwrap();
        assert!(text.starts_with("---\n"));
        assert!(text.contains("type: MODIFIED"));
    }

    #[test]
    fn test_status_for_not_found() {
        let status = status_for(&WrapperError::NotFound {
            kind: "nodes".to_string(),
            name: "edge-1".to_string(),
        });
        assert_eq!(status.code, Some(404));
        assert_eq!(status.reason.as_deref(), Some("NotFound"));
        let details = status.details.unwrap();
        assert_eq!(details.name.as_deref(), Some("edge-1"));

        let value = serde_json::to_value(status_for(&WrapperError::Shutdown)).unwrap();
        assert_eq!(value["kind"], "Status");
        assert_eq!(value["status"], "Failure");
    }
}
