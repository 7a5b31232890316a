//! XML response bodies, trimmed from the teacher's `s3::responses` down
//! to what a put/multipart/get-object client actually parses, plus a
//! freshly-authored `ListPartsResult` (the teacher has no `ListParts`
//! action to ground one on; shaped after AWS's documented response and
//! the sibling `ListMultipartUploadsResult`/`Upload` structs).

use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename = "Error")]
pub struct ErrorResponse {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "RequestId")]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename = "InitiateMultipartUploadResult")]
pub struct InitiateMultipartUploadResult {
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename = "CompleteMultipartUploadResult")]
pub struct CompleteMultipartUploadResult {
    #[serde(rename = "Location")]
    pub location: Option<String>,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "ETag")]
    pub e_tag: String,
}

/// A single already-uploaded part, as returned inside a `ListParts`
/// response.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename = "Part")]
pub struct Part {
    #[serde(rename = "PartNumber")]
    pub part_number: u16,
    #[serde(rename = "ETag")]
    pub e_tag: String,
    #[serde(rename = "Size")]
    pub size: u64,
}

/// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_ListParts.html>
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename = "ListPartsResult")]
pub struct ListPartsResult {
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
    #[serde(rename = "IsTruncated", default)]
    pub is_truncated: bool,
    #[serde(rename = "Part", default)]
    pub parts: Vec<Part>,
}
