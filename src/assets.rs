//! Client for the 3D asset generation service
//!
//! Talks to a Trellis-style HTTP server that turns a text description into a
//! binary GLB model. Generated models are saved under the configured output
//! directory and referenced by path in placement messages.

use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::{Error, Result};

/// Generates 3D assets from text descriptions
pub struct AssetGenerator {
    client: reqwest::Client,
    base_url: String,
    output_dir: PathBuf,
    seed: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    seed: u32,
}

impl AssetGenerator {
    /// Create a new client, ensuring the output directory exists
    ///
    /// # Errors
    ///
    /// Returns error if the output directory cannot be created
    pub fn new(base_url: impl Into<String>, output_dir: impl Into<PathBuf>, seed: u32) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            output_dir,
            seed,
        })
    }

    /// Probe the generation service's health endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the service is unreachable
    pub async fn health(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    /// Generate a model for `description` and save it to disk.
    ///
    /// Returns the path of the saved GLB file.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails, the service reports an error, or
    /// the response body is empty.
    pub async fn generate(&self, description: &str) -> Result<PathBuf> {
        let url = format!("{}/generate/text", self.base_url);
        tracing::info!(description = %description, seed = self.seed, "requesting asset generation");

        let request = GenerateRequest {
            prompt: description,
            seed: self.seed,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "asset generation request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "asset service error");
            return Err(Error::Asset(format!("asset service error {status}: {body}")));
        }

        let payload = response.bytes().await?;
        if payload.is_empty() {
            return Err(Error::Asset("asset service returned an empty model".to_string()));
        }

        let path = self.output_dir.join(asset_file_name(description));
        tokio::fs::write(&path, &payload).await?;
        tracing::info!(path = %path.display(), bytes = payload.len(), "asset saved");

        Ok(path)
    }
}

/// Derive a filesystem-safe GLB file name from a description.
///
/// A short random suffix keeps repeated descriptions from clobbering each
/// other's files.
fn asset_file_name(description: &str) -> String {
    let mut slug: String = description
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    while slug.contains("__") {
        slug = slug.replace("__", "_");
    }
    let slug = slug.trim_matches('_');
    let slug = if slug.is_empty() { "object" } else { slug };
    let truncated: String = slug.chars().take(48).collect();

    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}.glb", truncated.trim_end_matches('_'), &suffix[..8])
}

/// Path of an asset as viewers should reference it
#[must_use]
pub fn asset_wire_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_slugged_and_unique() {
        let a = asset_file_name("a cute house with flowers");
        let b = asset_file_name("a cute house with flowers");
        assert!(a.starts_with("a_cute_house_with_flowers_"));
        assert!(a.ends_with(".glb"));
        assert_ne!(a, b);
    }

    #[test]
    fn degenerate_descriptions_still_name_a_file() {
        let name = asset_file_name("!!!");
        assert!(name.starts_with("object_"));
    }

    #[tokio::test]
    async fn output_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("models");
        let generator = AssetGenerator::new("http://localhost:8000", &nested, 1).unwrap();
        assert!(nested.is_dir());
        drop(generator);
    }

    #[tokio::test]
    async fn unreachable_service_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // Port 1 is never bound in test environments
        let generator = AssetGenerator::new("http://127.0.0.1:1", dir.path(), 1).unwrap();
        assert!(generator.generate("a small rock").await.is_err());
    }
}
