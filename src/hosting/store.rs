//! Filesystem-backed upload store. Bundles arrive as zip files bound to an
//! author name and can be unpacked under a URL-safe path for hosted viewing.

use std::fs;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use zip::ZipArchive;

use crate::error::TourError;
use crate::paths;
use crate::project::{atomic_write, read_json, slugify, write_json};

/// One uploaded bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    /// Stored filename; the key for every other operation.
    pub filename: String,
    pub author: String,
    pub uploaded_at: DateTime<Utc>,
    pub size: u64,
    /// Slug the bundle is currently hosted under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosted_path: Option<String>,
}

impl UploadRecord {
    pub fn hosted_url(&self) -> Option<String> {
        self.hosted_path.as_deref().map(hosted_url)
    }
}

/// Site-relative URL a hosted slug is served from.
pub fn hosted_url(slug: &str) -> String {
    format!("{}/{slug}/", paths::HOSTED_URL_PREFIX)
}

pub struct HostingStore {
    data_dir: PathBuf,
    index: Mutex<Vec<UploadRecord>>,
}

impl HostingStore {
    /// Open (creating if needed) a store rooted at `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, TourError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(paths::uploads_dir(&data_dir))?;
        fs::create_dir_all(paths::hosted_dir(&data_dir))?;
        let index_path = paths::upload_index_path(&data_dir);
        let index = if index_path.exists() {
            read_json(&index_path)?
        } else {
            Vec::new()
        };
        Ok(Self {
            data_dir,
            index: Mutex::new(index),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory hosted bundles are unpacked into.
    pub fn hosted_root(&self) -> PathBuf {
        paths::hosted_dir(&self.data_dir)
    }

    /// Store a bundle zip for `author`. The archive must contain a viewer
    /// `config.json` at its root.
    pub fn upload(&self, author: &str, bytes: &[u8]) -> Result<UploadRecord, TourError> {
        let author = author.trim();
        if author.is_empty() {
            return Err(TourError::validation("Uploads need an author name"));
        }
        check_bundle(Cursor::new(bytes))?;

        let mut index = self.index.lock();
        let uploaded_at = Utc::now();
        let stem = format!("{}_{}", slugify(author), uploaded_at.format("%Y%m%d%H%M%S%3f"));
        let mut filename = format!("{stem}.zip");
        let mut n = 1;
        while index.iter().any(|r| r.filename == filename) {
            n += 1;
            filename = format!("{stem}-{n}.zip");
        }

        atomic_write(&paths::uploads_dir(&self.data_dir).join(&filename), bytes)?;
        let record = UploadRecord {
            filename,
            author: author.to_string(),
            uploaded_at,
            size: bytes.len() as u64,
            hosted_path: None,
        };
        index.push(record.clone());
        self.save_index(&index)?;
        log::info!("Stored upload {} from {author}", record.filename);
        Ok(record)
    }

    pub fn list(&self) -> Vec<UploadRecord> {
        self.index.lock().clone()
    }

    pub fn get(&self, filename: &str) -> Option<UploadRecord> {
        self.index.lock().iter().find(|r| r.filename == filename).cloned()
    }

    /// Unpack an upload under `hosted/<slug(path)>` and return its URL.
    /// Hosting again moves the bundle; a slug held by another upload is refused.
    pub fn host(&self, filename: &str, path: &str) -> Result<String, TourError> {
        let slug = slugify(path);
        let mut index = self.index.lock();
        if let Some(other) = index
            .iter()
            .find(|r| r.filename != filename && r.hosted_path.as_deref() == Some(slug.as_str()))
        {
            return Err(TourError::validation(format!(
                "'{slug}' is already used by {}",
                other.filename
            )));
        }
        let record = index
            .iter_mut()
            .find(|r| r.filename == filename)
            .ok_or_else(|| TourError::not_found(format!("Upload '{filename}'")))?;

        let hosted = self.hosted_root();
        let staging = hosted.join(format!(".{slug}.partial"));
        remove_dir_if_present(&staging)?;
        let archive = fs::File::open(paths::uploads_dir(&self.data_dir).join(filename))?;
        let written = extract_bundle(archive, &staging)?;

        if let Some(previous) = record.hosted_path.take() {
            remove_dir_if_present(&hosted.join(previous))?;
        }
        let target = hosted.join(&slug);
        remove_dir_if_present(&target)?;
        fs::rename(&staging, &target)?;
        record.hosted_path = Some(slug.clone());
        self.save_index(&index)?;

        log::info!("Hosting {filename} at {slug} ({written} files)");
        Ok(hosted_url(&slug))
    }

    pub fn unhost(&self, filename: &str) -> Result<(), TourError> {
        let mut index = self.index.lock();
        let record = index
            .iter_mut()
            .find(|r| r.filename == filename)
            .ok_or_else(|| TourError::not_found(format!("Upload '{filename}'")))?;
        let slug = record
            .hosted_path
            .take()
            .ok_or_else(|| TourError::validation(format!("{filename} is not hosted")))?;
        remove_dir_if_present(&self.hosted_root().join(&slug))?;
        self.save_index(&index)?;
        log::info!("Stopped hosting {filename} at {slug}");
        Ok(())
    }

    /// Remove an upload, unhosting it first.
    pub fn delete(&self, filename: &str) -> Result<UploadRecord, TourError> {
        let mut index = self.index.lock();
        let position = index
            .iter()
            .position(|r| r.filename == filename)
            .ok_or_else(|| TourError::not_found(format!("Upload '{filename}'")))?;
        let record = index.remove(position);
        if let Some(slug) = &record.hosted_path {
            remove_dir_if_present(&self.hosted_root().join(slug))?;
        }
        match fs::remove_file(paths::uploads_dir(&self.data_dir).join(filename)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Upload file {filename} was already gone");
            }
            Err(e) => return Err(e.into()),
        }
        self.save_index(&index)?;
        log::info!("Deleted upload {filename}");
        Ok(record)
    }

    fn save_index(&self, index: &[UploadRecord]) -> Result<(), TourError> {
        write_json(&paths::upload_index_path(&self.data_dir), &index)?;
        Ok(())
    }
}

fn remove_dir_if_present(dir: &Path) -> Result<(), TourError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn check_bundle<R: Read + Seek>(reader: R) -> Result<(), TourError> {
    let archive = ZipArchive::new(reader)
        .map_err(|e| TourError::validation(format!("Upload is not a zip archive: {e}")))?;
    if archive.index_for_name(paths::CONFIG_JSON).is_none() {
        return Err(TourError::validation(format!(
            "Bundle has no {} at its root",
            paths::CONFIG_JSON
        )));
    }
    Ok(())
}

/// Unpack every regular entry under `dest`. Entries whose names would escape
/// `dest` are skipped. Returns the number of files written.
fn extract_bundle<R: Read + Seek>(reader: R, dest: &Path) -> Result<usize, TourError> {
    let mut archive = ZipArchive::new(reader)?;
    fs::create_dir_all(dest)?;
    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            log::warn!("Skipping unsafe zip entry '{}'", entry.name());
            continue;
        };
        let out = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&out)?;
        std::io::copy(&mut entry, &mut file)?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
pub(crate) mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    pub(crate) fn bundle_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn fresh(name: &str) -> (PathBuf, HostingStore) {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        let store = HostingStore::open(&dir).unwrap();
        (dir, store)
    }

    #[test]
    fn upload_host_unhost_delete() {
        let (dir, store) = fresh("panotour_test_hosting_cycle");
        let zip = bundle_zip(&[("config.json", "{}"), ("index.html", "<html>"), ("images/scene_1.jpg", "jpg")]);

        let record = store.upload("  Ada Lovelace ", &zip).unwrap();
        assert!(record.filename.starts_with("ada-lovelace_"));
        assert_eq!(record.author, "Ada Lovelace");
        assert_eq!(store.list().len(), 1);

        let url = store.host(&record.filename, "Ada's Museum").unwrap();
        assert_eq!(url, "/tours/ada-s-museum/");
        let hosted = store.hosted_root().join("ada-s-museum");
        assert_eq!(fs::read_to_string(hosted.join("index.html")).unwrap(), "<html>");
        assert!(hosted.join("images/scene_1.jpg").exists());

        // hosting again moves the bundle
        store.host(&record.filename, "gallery").unwrap();
        assert!(!hosted.exists());
        assert_eq!(store.get(&record.filename).unwrap().hosted_url().as_deref(), Some("/tours/gallery/"));

        store.unhost(&record.filename).unwrap();
        assert!(!store.hosted_root().join("gallery").exists());
        assert!(store.unhost(&record.filename).is_err());

        store.delete(&record.filename).unwrap();
        assert!(store.list().is_empty());
        assert!(matches!(store.delete(&record.filename), Err(TourError::NotFound { .. })));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn index_survives_reopen() {
        let (dir, store) = fresh("panotour_test_hosting_reopen");
        let zip = bundle_zip(&[("config.json", "{}")]);
        let a = store.upload("Sam", &zip).unwrap();
        let b = store.upload("Sam", &zip).unwrap();
        assert_ne!(a.filename, b.filename);
        store.host(&a.filename, "sam").unwrap();
        drop(store);

        let reopened = HostingStore::open(&dir).unwrap();
        let records = reopened.list();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].hosted_path.as_deref(), Some("sam"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_bad_uploads_and_taken_slugs() {
        let (dir, store) = fresh("panotour_test_hosting_reject");
        assert!(store.upload("", &bundle_zip(&[("config.json", "{}")])).is_err());
        assert!(store.upload("Kim", b"not a zip").is_err());
        assert!(store.upload("Kim", &bundle_zip(&[("index.html", "")])).is_err());

        let zip = bundle_zip(&[("config.json", "{}")]);
        let a = store.upload("Kim", &zip).unwrap();
        let b = store.upload("Lee", &zip).unwrap();
        store.host(&a.filename, "shared").unwrap();
        assert!(store.host(&b.filename, "Shared").is_err());
        assert!(matches!(store.host("nope.zip", "x"), Err(TourError::NotFound { .. })));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn extraction_skips_escaping_entries() {
        let dir = std::env::temp_dir().join("panotour_test_hosting_escape");
        let _ = fs::remove_dir_all(&dir);
        let zip = bundle_zip(&[("config.json", "{}"), ("../evil.txt", "x")]);
        let written = extract_bundle(Cursor::new(zip), &dir.join("out")).unwrap();
        assert_eq!(written, 1);
        assert!(!dir.join("evil.txt").exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
