use serde::{Deserialize, Serialize};

/// Metadata for one object in the remote store.
///
/// Field names follow the store's JSON listing, so a cached descriptor list
/// is the listing's `items` array verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileDescriptor {
    pub bucket: String,
    #[serde(rename = "name")]
    pub object_name: String,
    #[serde(rename = "contentType", default)]
    pub content_type: String,
    #[serde(rename = "mediaLink", default)]
    pub media_link: String,
    /// Object size in bytes; the JSON API encodes it as a decimal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Base64 encoded MD5 digest of the object body.
    #[serde(rename = "md5Hash", default, skip_serializing_if = "Option::is_none")]
    pub md5_hash: Option<String>,
}

impl RemoteFileDescriptor {
    /// Archive format, if the content type is one we can mirror.
    pub fn archive_format(&self) -> Option<ArchiveFormat> {
        ArchiveFormat::from_content_type(&self.content_type)
    }

    /// Last path segment of the object name.
    pub fn file_name(&self) -> &str {
        self.object_name
            .rsplit('/')
            .next()
            .unwrap_or(&self.object_name)
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }
}

/// Comic archive formats stored remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Cbr,
    Cbz,
}

impl ArchiveFormat {
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "application/x-cbr" => Some(ArchiveFormat::Cbr),
            "application/x-cbz" => Some(ArchiveFormat::Cbz),
            _ => None,
        }
    }

    /// Detect the format from a local filename's extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, extension) = name.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "cbr" => Some(ArchiveFormat::Cbr),
            "cbz" => Some(ArchiveFormat::Cbz),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArchiveFormat::Cbr => "application/x-cbr",
            ArchiveFormat::Cbz => "application/x-cbz",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Cbr => "cbr",
            ArchiveFormat::Cbz => "cbz",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_uses_store_field_names() {
        let descriptor: RemoteFileDescriptor = serde_json::from_value(json!({
            "kind": "storage#object",
            "bucket": "long-box",
            "name": "comics/e8/03/3e8/Test Issue 1.cbz",
            "contentType": "application/x-cbz",
            "mediaLink": "https://storage.example/download/1",
            "size": "1024",
            "md5Hash": "1B2M2Y8AsgTpgAmY7PhCfg=="
        }))
        .unwrap();

        assert_eq!(descriptor.file_name(), "Test Issue 1.cbz");
        assert_eq!(descriptor.archive_format(), Some(ArchiveFormat::Cbz));
        assert_eq!(descriptor.size_bytes(), Some(1024));

        let encoded = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(encoded["contentType"], "application/x-cbz");
        assert_eq!(encoded["md5Hash"], "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn test_archive_format_detection() {
        assert_eq!(
            ArchiveFormat::from_content_type("application/x-cbr"),
            Some(ArchiveFormat::Cbr)
        );
        assert_eq!(ArchiveFormat::from_content_type("application/pdf"), None);
        assert_eq!(
            ArchiveFormat::from_file_name("Saga 43.CBZ"),
            Some(ArchiveFormat::Cbz)
        );
        assert_eq!(ArchiveFormat::from_file_name("notes.txt"), None);
        assert_eq!(ArchiveFormat::from_file_name("cbr"), None);
    }
}
