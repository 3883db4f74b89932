use axum::body::Bytes;
use ledger::{CaptionId, Store, VoteEvent, get_vote_from_bytes};

use crate::{
    error::AppError::{self, CaptionNotFound, MalformedPayload},
    identity::User,
};

/// Decodes a vote body and checks it against the caption table.
///
/// The value must be `+1` or `-1`, and the caption must exist with content.
pub async fn get_vote_from_body(store: &dyn Store, user: &User, body: Bytes) -> Result<VoteEvent, AppError> {
    let payload = get_vote_from_bytes(body).map_err(|_| MalformedPayload)?;

    if !matches!(payload.vote_value, 1 | -1) || payload.caption_id.is_empty() {
        return Err(MalformedPayload);
    }

    let caption_id = CaptionId::from(payload.caption_id);
    match store.caption(&caption_id).await? {
        Some(caption) if caption.content.is_some() => {}
        _ => return Err(CaptionNotFound(caption_id)),
    }

    Ok(VoteEvent::new(caption_id, user.id.clone(), i64::from(payload.vote_value)))
}

#[cfg(test)]
mod tests {
    use ledger::{Caption, MemoryStore, VotePayload};
    use prost::Message;

    use super::*;
    use crate::testutil::user;

    fn store() -> MemoryStore {
        MemoryStore::with_captions([
            Caption {
                id: "c1".into(),
                content: Some("when the build passes first try".to_string()),
                image_url: None,
            },
            Caption {
                id: "blank".into(),
                content: None,
                image_url: None,
            },
        ])
    }

    fn body(caption_id: &str, vote_value: i32) -> Bytes {
        Bytes::from(
            VotePayload {
                caption_id: caption_id.to_string(),
                vote_value,
            }
            .encode_to_vec(),
        )
    }

    #[tokio::test]
    async fn test_valid_vote() {
        let event = get_vote_from_body(&store(), &user("u1", "a@columbia.edu"), body("c1", -1))
            .await
            .unwrap();

        assert_eq!(event, VoteEvent::new("c1", "u1", -1));
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_value() {
        for value in [0, 2, -5] {
            let result = get_vote_from_body(&store(), &user("u1", "a@columbia.edu"), body("c1", value)).await;
            assert!(matches!(result, Err(MalformedPayload)));
        }
    }

    #[tokio::test]
    async fn test_rejects_garbage() {
        let result = get_vote_from_body(
            &store(),
            &user("u1", "a@columbia.edu"),
            Bytes::from_static(&[0xff, 0xff, 0xff]),
        )
        .await;

        assert!(matches!(result, Err(MalformedPayload)));
    }

    #[tokio::test]
    async fn test_rejects_unknown_or_empty_caption() {
        for caption in ["missing", "blank"] {
            let result = get_vote_from_body(&store(), &user("u1", "a@columbia.edu"), body(caption, 1)).await;
            assert!(matches!(result, Err(CaptionNotFound(_))));
        }
    }
}
