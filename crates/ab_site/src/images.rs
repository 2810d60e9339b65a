use ab_core::{with_retry, Error, HttpFetch, ImageAsset, Result, RetryPolicy};
use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const TITLE_FRAGMENT_CHARS: usize = 40;

/// Downloads the first usable image among an article's candidates into the
/// site's image directory.
pub struct ImageAcquirer {
    http: Arc<dyn HttpFetch>,
    retry: RetryPolicy,
    images_dir: PathBuf,
    max_width: Option<u32>,
}

impl ImageAcquirer {
    pub fn new(http: Arc<dyn HttpFetch>, retry: RetryPolicy, images_dir: impl AsRef<Path>, max_width: Option<u32>) -> Self {
        Self {
            http,
            retry,
            images_dir: images_dir.as_ref().to_path_buf(),
            max_width,
        }
    }

    /// Tries `candidates` in order. Unreachable URLs and payloads that do not
    /// decode as an image are skipped; `Error::Image` when none is usable.
    pub async fn acquire(&self, candidates: &[String], title: &str, published_at: DateTime<Utc>) -> Result<ImageAsset> {
        if candidates.is_empty() {
            return Err(Error::Image("no image candidates".to_string()));
        }
        fs::create_dir_all(&self.images_dir).await?;

        for url in candidates {
            match self.try_candidate(url, title, published_at).await {
                Ok(asset) => return Ok(asset),
                Err(e) => warn!("🖼️ Skipping image {}: {}", url, e),
            }
        }
        Err(Error::Image(format!("none of {} candidates could be used", candidates.len())))
    }

    async fn try_candidate(&self, url: &str, title: &str, published_at: DateTime<Utc>) -> Result<ImageAsset> {
        let file_name = image_file_name(url, title, published_at);
        let path = self.images_dir.join(&file_name);

        if fs::try_exists(&path).await? {
            if let Ok((width, height)) = dimensions(&path).await {
                debug!("Reusing {}", path.display());
                return Ok(ImageAsset {
                    source_url: url.to_string(),
                    path,
                    file_name,
                    width,
                    height,
                });
            }
        }

        let response = with_retry(&self.retry, url, || self.http.get(url)).await?;
        let target = ImageFormat::from_path(&path).map_err(|e| Error::Image(e.to_string()))?;
        let (payload, (mut width, mut height)) =
            tokio::task::spawn_blocking(move || normalize_payload(response.body, target))
                .await
                .map_err(|e| Error::External(e.into()))??;

        let partial = part_path(&path);
        if let Err(e) = write_into_place(&partial, &path, &payload).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e);
        }
        info!("🖼️ Saved image {}", path.display());

        if let Some(max_width) = self.max_width {
            match resize_in_place(&path, max_width).await {
                Ok(size) => (width, height) = size,
                Err(e) => warn!("⚠️ Could not resize {}: {}", path.display(), e),
            }
        }

        Ok(ImageAsset {
            source_url: url.to_string(),
            path,
            file_name,
            width,
            height,
        })
    }
}

/// Checks that `bytes` decode as an image and re-encodes them as `target`
/// when the payload is in another format, so the file extension always
/// matches the content.
fn normalize_payload(bytes: Vec<u8>, target: ImageFormat) -> Result<(Vec<u8>, (u32, u32))> {
    let actual = image::guess_format(&bytes).map_err(|e| Error::Image(format!("not a decodable image: {}", e)))?;
    if actual == target {
        let size = ImageReader::with_format(Cursor::new(&bytes), actual)
            .into_dimensions()
            .map_err(|e| Error::Image(format!("not a decodable image: {}", e)))?;
        return Ok((bytes, size));
    }

    let img = image::load_from_memory_with_format(&bytes, actual)
        .map_err(|e| Error::Image(format!("not a decodable image: {}", e)))?;
    debug!("Converting {:?} payload to {:?}", actual, target);
    let size = (img.width(), img.height());
    let mut out = Cursor::new(Vec::new());
    encodable(img, target)
        .write_to(&mut out, target)
        .map_err(|e| Error::Image(format!("cannot encode as {:?}: {}", target, e)))?;
    Ok((out.into_inner(), size))
}

/// JPEG has no alpha channel; the other targets take RGBA.
fn encodable(img: DynamicImage, format: ImageFormat) -> DynamicImage {
    match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        _ => DynamicImage::ImageRgba8(img.to_rgba8()),
    }
}

async fn write_into_place(partial: &Path, path: &Path, payload: &[u8]) -> Result<()> {
    fs::write(partial, payload).await?;
    fs::rename(partial, path).await?;
    Ok(())
}

/// Opens `path` by sniffing its content rather than trusting the extension.
fn open_sniffed(path: &Path) -> Result<ImageReader<std::io::BufReader<std::fs::File>>> {
    Ok(ImageReader::open(path)?.with_guessed_format()?)
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

async fn dimensions(path: &Path) -> Result<(u32, u32)> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        open_sniffed(&path)?
            .into_dimensions()
            .map_err(|e| Error::Image(e.to_string()))
    })
    .await
    .map_err(|e| Error::External(e.into()))?
}

/// `<title fragment>_<8 hex of sha256(url)>_<published_at><ext>`. Depends
/// only on its inputs, so a rerun finds the file it wrote before.
pub fn image_file_name(url: &str, title: &str, published_at: DateTime<Utc>) -> String {
    let mut fragment: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .filter(|c| c.is_ascii())
        .take(TITLE_FRAGMENT_CHARS)
        .collect();
    fragment = fragment.trim_matches('_').to_string();
    if fragment.is_empty() {
        fragment = "image".to_string();
    }

    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    format!(
        "{}_{}_{}.{}",
        fragment,
        &digest[..8],
        published_at.format("%Y%m%d%H%M%S"),
        extension_from_url(url)
    )
}

fn extension_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            let path = u.path().to_lowercase();
            let (_, ext) = path.rsplit_once('.')?;
            ALLOWED_EXTENSIONS.contains(&ext).then(|| ext.to_string())
        })
        .unwrap_or_else(|| "jpg".to_string())
}

/// Shrinks the image to `max_width`, keeping its aspect ratio, and
/// overwrites the file. Narrower images are left alone. Returns the final
/// dimensions.
pub async fn resize_in_place(path: &Path, max_width: u32) -> Result<(u32, u32)> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(u32, u32)> {
        let reader = open_sniffed(&path)?;
        let format = reader
            .format()
            .ok_or_else(|| Error::Image(format!("unknown image format: {}", path.display())))?;
        let img = reader.decode().map_err(|e| Error::Image(e.to_string()))?;
        let (width, height) = (img.width(), img.height());
        if max_width == 0 || width <= max_width {
            return Ok((width, height));
        }

        let new_height = ((height as u64 * max_width as u64) / width as u64).max(1) as u32;
        let resized = encodable(img.resize_exact(max_width, new_height, FilterType::Lanczos3), format);

        let partial = part_path(&path);
        resized
            .save_with_format(&partial, format)
            .map_err(|e| Error::Image(e.to_string()))?;
        std::fs::rename(&partial, &path)?;
        info!("Image resized to {}x{}: {}", max_width, new_height, path.display());
        Ok((max_width, new_height))
    })
    .await
    .map_err(|e| Error::External(e.into()))?
}
