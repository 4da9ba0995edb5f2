use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Imaging notification received on the imaging topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagingRequest {
    pub patient_id: String,
    pub patient_name: String,
    /// Path of the image in the imaging store.
    pub path: String,
}

impl ImagingRequest {
    /// Parse an imaging topic payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Image retrieved for an [`ImagingRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagingResult {
    pub patient_id: String,
    pub patient_name: String,
    pub path: String,
    #[serde(rename = "DicomImage", with = "crate::base64_bytes")]
    pub image_bytes: Vec<u8>,
}

impl ImagingResult {
    pub fn new(request: ImagingRequest, image_bytes: Vec<u8>) -> Self {
        Self {
            patient_id: request.patient_id,
            patient_name: request.patient_name,
            path: request.path,
            image_bytes,
        }
    }
}
