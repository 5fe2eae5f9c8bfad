//! HuggingFace model resolution
//!
//! Downloads model weights, projectors, tokenizer files, and audio assets
//! from HuggingFace Hub into the local models directory.

use crate::storage::settings::RunnerSettings;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Errors from hub resolution
#[derive(Debug, Error)]
pub enum HubError {
    #[error("invalid hub locator: {0}")]
    InvalidLocator(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("download of {url} failed with status {status}")]
    Status { url: String, status: u16 },
    #[error("could not determine the size of {0}")]
    NoSize(String),
    #[error("download incomplete: got {got} bytes, expected {expected}")]
    Incomplete { got: u64, expected: u64 },
    #[error("no .gguf weight file found in {0}")]
    NoWeights(String),
    #[error("multiple .gguf weight files in {repo}, specify one of: {files}")]
    AmbiguousWeights { repo: String, files: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parsed reference to a file inside a HuggingFace repo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubLocator {
    pub repo_id: String,
    pub filename: String,
    pub revision: String,
}

impl HubLocator {
    /// Parse the locator formats accepted for model and adapter sources:
    ///
    /// 1. `https://huggingface.co/owner/repo/blob/main/file`
    /// 2. `https://huggingface.co/owner/repo/resolve/main/file`
    /// 3. `owner/repo/path/to/file`
    /// 4. `owner/repo`
    pub fn parse(source: &str) -> Result<Self, HubError> {
        let source = source.trim();
        let source = source.split('?').next().unwrap_or(source);
        let source = source.split('#').next().unwrap_or(source);

        if source.contains("huggingface.co") {
            let path = source
                .replace("https://huggingface.co/", "")
                .replace("http://huggingface.co/", "");

            let parts: Vec<&str> = path.split('/').collect();
            if parts.len() < 2 {
                return Err(HubError::InvalidLocator(source.to_string()));
            }
            let repo_id = format!("{}/{}", parts[0], parts[1]);

            if let Some(pos) = parts.iter().position(|&p| p == "blob" || p == "resolve") {
                if parts.len() > pos + 2 {
                    return Ok(Self {
                        repo_id,
                        filename: parts[pos + 2..].join("/"),
                        revision: parts[pos + 1].to_string(),
                    });
                }
            }

            return Ok(Self {
                repo_id,
                filename: String::new(),
                revision: "main".to_string(),
            });
        }

        let parts: Vec<&str> = source.split('/').collect();
        if parts.len() >= 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            return Ok(Self {
                repo_id: format!("{}/{}", parts[0], parts[1]),
                filename: if parts.len() > 2 {
                    parts[2..].join("/")
                } else {
                    String::new()
                },
                revision: "main".to_string(),
            });
        }

        Err(HubError::InvalidLocator(source.to_string()))
    }

    /// Build the download URL for the file
    pub fn download_url(&self) -> String {
        format!(
            "https://huggingface.co/{}/resolve/{}/{}",
            self.repo_id, self.revision, self.filename
        )
    }
}

fn sanitize_local_filename(filename: &str) -> Result<String, HubError> {
    let trimmed = filename.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(HubError::InvalidLocator(filename.to_string()));
    }

    let flattened = trimmed.replace('\\', "/").replace('/', "__");

    let mut sanitized = String::with_capacity(flattened.len());
    for ch in flattened.chars() {
        let invalid = matches!(ch, '<' | '>' | ':' | '"' | '|' | '?' | '*');
        if invalid || ch.is_control() {
            sanitized.push('_');
        } else {
            sanitized.push(ch);
        }
    }

    while sanitized.ends_with('.') || sanitized.ends_with(' ') {
        sanitized.pop();
    }

    if sanitized.is_empty() {
        return Err(HubError::InvalidLocator(filename.to_string()));
    }

    Ok(sanitized)
}

/// Local cache name for a repo file, unique per repo/revision/file
fn local_name(repo_id: &str, revision: &str, filename: &str) -> Result<String, HubError> {
    if revision == "main" {
        sanitize_local_filename(&format!("{}/{}", repo_id, filename))
    } else {
        sanitize_local_filename(&format!("{}/{}/{}", repo_id, revision, filename))
    }
}

/// Download one file from a repo into the models directory.
///
/// Present files are reused without touching the network.
pub async fn download_file(
    settings: &RunnerSettings,
    repo_id: &str,
    revision: &str,
    filename: &str,
) -> Result<PathBuf, HubError> {
    let locator = HubLocator {
        repo_id: repo_id.to_string(),
        filename: filename.to_string(),
        revision: revision.to_string(),
    };
    let url = locator.download_url();

    fs::create_dir_all(&settings.models_directory)?;
    let safe_name = local_name(repo_id, revision, filename)?;
    let output_path = settings.models_directory.join(&safe_name);
    let temp_path = settings.models_directory.join(format!("{}.tmp", safe_name));

    if output_path.exists() {
        let metadata = fs::metadata(&output_path)?;
        if metadata.len() > 0 {
            tracing::debug!("Using cached file: {:?}", output_path);
            return Ok(output_path);
        }
    }

    tracing::info!("Downloading from: {}", url);
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(settings.http_timeout_secs))
        .build()?;

    let response = client
        .get(&url)
        .header("User-Agent", "voxrun/0.2.0")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(HubError::Status {
            url,
            status: response.status().as_u16(),
        });
    }

    let total_size = response
        .content_length()
        .ok_or_else(|| HubError::NoSize(url.clone()))?;
    tracing::info!("File size: {} bytes ({} MB)", total_size, total_size / 1024 / 1024);

    let mut temp_file = File::create(&temp_path).await?;
    let mut response = response;
    let mut downloaded: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        temp_file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
    }
    temp_file.flush().await?;

    if downloaded != total_size {
        return Err(HubError::Incomplete {
            got: downloaded,
            expected: total_size,
        });
    }

    fs::rename(&temp_path, &output_path)?;
    tracing::info!("Download complete: {:?}", output_path);

    Ok(output_path)
}

/// List the file paths available in a repo revision
pub async fn list_repo_files(
    settings: &RunnerSettings,
    repo_id: &str,
    revision: &str,
) -> Result<Vec<String>, HubError> {
    let api_url = format!(
        "https://huggingface.co/api/models/{}/tree/{}",
        repo_id, revision
    );

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(settings.http_timeout_secs.min(120)))
        .build()?;
    let response = client
        .get(&api_url)
        .header("User-Agent", "voxrun/0.2.0")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(HubError::Status {
            url: api_url,
            status: response.status().as_u16(),
        });
    }

    let files: Vec<FileInfo> = response.json().await?;
    Ok(files.into_iter().map(|f| f.path).collect())
}

#[derive(Debug, serde::Deserialize)]
struct FileInfo {
    path: String,
}

fn is_projector(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .unwrap_or(path)
        .starts_with("mmproj")
}

/// Resolve the GGUF weight file of a repo: the explicitly named file, or the
/// lone non-projector `.gguf` when the builder did not name one.
pub async fn resolve_gguf(
    settings: &RunnerSettings,
    repo_id: &str,
    revision: &str,
    explicit: Option<&str>,
) -> Result<PathBuf, HubError> {
    if let Some(filename) = explicit {
        return download_file(settings, repo_id, revision, filename).await;
    }

    let files = list_repo_files(settings, repo_id, revision).await?;
    let ggufs: Vec<String> = files
        .into_iter()
        .filter(|f| f.ends_with(".gguf") && !is_projector(f))
        .collect();

    match ggufs.len() {
        0 => Err(HubError::NoWeights(repo_id.to_string())),
        1 => download_file(settings, repo_id, revision, &ggufs[0]).await,
        _ => Err(HubError::AmbiguousWeights {
            repo: repo_id.to_string(),
            files: ggufs.join(", "),
        }),
    }
}

/// Resolve the multimodal projector of a repo, if it ships one.
pub async fn resolve_mmproj(
    settings: &RunnerSettings,
    repo_id: &str,
    revision: &str,
    explicit: Option<&str>,
) -> Result<Option<PathBuf>, HubError> {
    if let Some(filename) = explicit {
        return Ok(Some(download_file(settings, repo_id, revision, filename).await?));
    }

    let files = list_repo_files(settings, repo_id, revision).await?;
    let mut projectors: Vec<String> = files
        .into_iter()
        .filter(|f| f.ends_with(".gguf") && is_projector(f))
        .collect();
    projectors.sort();

    match projectors.into_iter().next() {
        Some(filename) => Ok(Some(
            download_file(settings, repo_id, revision, &filename).await?,
        )),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locator_full_url() {
        let url = "https://huggingface.co/ggml-org/Qwen2-Audio-7B-Instruct-GGUF/blob/main/model-q4_k_m.gguf";
        let parsed = HubLocator::parse(url).unwrap();
        assert_eq!(parsed.repo_id, "ggml-org/Qwen2-Audio-7B-Instruct-GGUF");
        assert_eq!(parsed.filename, "model-q4_k_m.gguf");
        assert_eq!(parsed.revision, "main");
    }

    #[test]
    fn test_parse_locator_resolve_url_with_revision() {
        let url = "https://huggingface.co/openbmb/MiniCPM-o-2_6/resolve/v2/tokenizer.json";
        let parsed = HubLocator::parse(url).unwrap();
        assert_eq!(parsed.repo_id, "openbmb/MiniCPM-o-2_6");
        assert_eq!(parsed.revision, "v2");
        assert_eq!(parsed.filename, "tokenizer.json");
    }

    #[test]
    fn test_parse_locator_short() {
        let parsed = HubLocator::parse("ibm-granite/granite-speech-3.3-8b/speech-lora").unwrap();
        assert_eq!(parsed.repo_id, "ibm-granite/granite-speech-3.3-8b");
        assert_eq!(parsed.filename, "speech-lora");
    }

    #[test]
    fn test_parse_locator_repo_only() {
        let parsed = HubLocator::parse("ibm-granite/granite-speech-3.3-8b").unwrap();
        assert_eq!(parsed.repo_id, "ibm-granite/granite-speech-3.3-8b");
        assert_eq!(parsed.filename, "");
        assert_eq!(parsed.revision, "main");
    }

    #[test]
    fn test_parse_locator_rejects_bare_name() {
        assert!(HubLocator::parse("not-a-repo").is_err());
        assert!(HubLocator::parse("").is_err());
    }

    #[test]
    fn test_local_name_flattens_paths() {
        let name = local_name("openbmb/MiniCPM-o-2_6", "main", "tokenizer.json").unwrap();
        assert_eq!(name, "openbmb__MiniCPM-o-2_6__tokenizer.json");

        let pinned = local_name("microsoft/Phi-4-multimodal-instruct", "refs/pr/70", "model.gguf")
            .unwrap();
        assert!(pinned.contains("refs__pr__70"));
    }

    #[test]
    fn test_projector_detection() {
        assert!(is_projector("mmproj-model-f16.gguf"));
        assert!(is_projector("sub/mmproj-q8_0.gguf"));
        assert!(!is_projector("model-q4_k_m.gguf"));
    }
}
