use serde::Deserialize;

pub const DEFAULT_REDIS_URL: &str = "redis://redis:6379";

/// One entry of an import file.
///
/// ```json
/// [
///     { "content": "me explaining lifetimes", "image_url": "https://img.example/1.png" },
///     { "content": "borrow checker at 3am" }
/// ]
/// ```
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
}
