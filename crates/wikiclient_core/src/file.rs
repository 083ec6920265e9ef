use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::edit::{Watchlist, map_mutation_error};
use crate::error::{Result, WikiError};
use crate::namespace::NS_FILE;
use crate::page::Page;
use crate::response::first_page;
use crate::session::{QueryOptions, Session};
use crate::transport::FilePart;

/// Latest revision of a file as described by `prop=imageinfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub timestamp: Option<String>,
    pub uploader: Option<String>,
    pub url: Option<String>,
    pub description_url: Option<String>,
    pub size: Option<u64>,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub sha1: Option<String>,
    pub mime: Option<String>,
    pub repository: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub text: String,
    pub comment: String,
    pub watchlist: Watchlist,
    pub ignore_warnings: bool,
}

#[derive(Debug, Clone)]
pub struct File {
    pub page: Page,
    info: Option<FileInfo>,
}

impl File {
    /// `title` may omit the namespace prefix.
    pub fn new(session: &Session, title: &str) -> Result<Self> {
        let page = Page::new(title)?;
        let title = page.title().unwrap_or(title);
        let qualified = match title.split_once(':') {
            Some((prefix, _)) if session.namespaces().name_to_id(prefix).ok() == Some(NS_FILE) => {
                title.to_string()
            }
            _ => format!("{}:{title}", session.namespaces().id_to_name(NS_FILE)?),
        };
        Ok(Self {
            page: Page::new(qualified)?,
            info: None,
        })
    }

    pub fn title(&self) -> &str {
        self.page.title().unwrap_or_default()
    }

    /// `None` until loaded, or when the wiki has no file under this name.
    pub fn info(&self) -> Option<&FileInfo> {
        self.info.as_ref()
    }

    pub fn load(&mut self, session: &Session) -> Result<()> {
        self.page.load(session)?;
        self.load_info(session)
    }

    pub fn load_info(&mut self, session: &Session) -> Result<()> {
        let response = session.query(
            &[
                ("action", "query".to_string()),
                ("prop", "imageinfo".to_string()),
                ("titles", self.title().to_string()),
                (
                    "iiprop",
                    "timestamp|user|url|size|sha1|mime".to_string(),
                ),
            ],
            &QueryOptions::single(),
        )?;
        let Some(page) = first_page(&response) else {
            self.info = None;
            return Ok(());
        };
        let Some(revision) = page
            .get("imageinfo")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
        else {
            self.info = None;
            return Ok(());
        };
        let text = |key: &str| revision.get(key).and_then(Value::as_str).map(ToString::to_string);
        let number = |key: &str| revision.get(key).and_then(Value::as_u64);
        self.info = Some(FileInfo {
            timestamp: text("timestamp"),
            uploader: text("user"),
            url: text("url"),
            description_url: text("descriptionurl"),
            size: number("size"),
            width: number("width"),
            height: number("height"),
            sha1: text("sha1"),
            mime: text("mime"),
            repository: page
                .get("imagerepository")
                .and_then(Value::as_str)
                .filter(|repository| !repository.is_empty())
                .map(ToString::to_string),
        });
        Ok(())
    }

    /// Fetch the file bytes and write them to `destination`.
    pub fn download(&self, session: &Session, destination: &Path) -> Result<u64> {
        let url = self
            .info
            .as_ref()
            .and_then(|info| info.url.as_deref())
            .ok_or_else(|| WikiError::NotFound(format!("{} has no file to download", self.title())))?;
        let bytes = session.fetch_bytes(&absolute_url(session, url))?;
        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(destination, &bytes)?;
        info!(file = %self.title(), path = %destination.display(), bytes = bytes.len(), "file downloaded");
        Ok(bytes.len() as u64)
    }

    /// Upload `bytes` as a new version of this file. Cached page and file
    /// info are dropped afterwards.
    pub fn upload(&mut self, session: &Session, bytes: Vec<u8>, request: &UploadRequest) -> Result<Value> {
        let token = session.assert_ability("edit")?;
        let file_name = self
            .title()
            .split_once(':')
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| self.title().to_string());
        let mut params = vec![
            ("action", "upload".to_string()),
            ("filename", file_name.clone()),
            ("text", request.text.clone()),
            ("comment", request.comment.clone()),
            ("watchlist", request.watchlist.as_param().to_string()),
            ("token", token),
        ];
        if request.ignore_warnings {
            params.push(("ignorewarnings", "1".to_string()));
        }
        let outcome = session.upload(
            &params,
            FilePart {
                field: "file".to_string(),
                file_name,
                bytes,
            },
        );
        self.page.invalidate();
        self.info = None;
        let response = outcome.map_err(|error| map_mutation_error(error, self.title()))?;

        let result = response
            .pointer("/upload/result")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        if result != "Success" {
            let detail = response.get("upload").map(Value::to_string).unwrap_or_default();
            return Err(WikiError::api(result, detail));
        }
        info!(file = %self.title(), "file uploaded");
        Ok(response)
    }
}

fn absolute_url(session: &Session, url: &str) -> String {
    if !url.starts_with("//") {
        return url.to_string();
    }
    let scheme = if session.endpoint().secure { "https:" } else { "http:" };
    format!("{scheme}{url}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{File, UploadRequest};
    use crate::error::WikiError;
    use crate::testing::{fast_config, session, token_reply};

    fn imageinfo() -> serde_json::Value {
        json!({"query": {"pages": [{
            "title": "File:Example.png",
            "imagerepository": "local",
            "imageinfo": [{
                "timestamp": "2023-02-01T10:00:00Z",
                "user": "Uploader",
                "size": 2048,
                "width": 64,
                "height": 32,
                "url": "//upload.example.org/Example.png",
                "descriptionurl": "https://en.wikipedia.org/wiki/File:Example.png",
                "sha1": "abc123",
                "mime": "image/png"
            }]
        }]}})
    }

    #[test]
    fn image_alias_is_accepted_as_the_file_prefix() {
        let (session, _, _) = session(fast_config());
        assert_eq!(File::new(&session, "Image:Logo.svg").expect("file").title(), "Image:Logo.svg");
        assert_eq!(File::new(&session, "Logo.svg").expect("file").title(), "File:Logo.svg");
    }

    #[test]
    fn imageinfo_fills_metadata() {
        let (session, transport, _) = session(fast_config());
        transport.reply(imageinfo());
        let mut file = File::new(&session, "Example.png").expect("file");
        file.load_info(&session).expect("info");
        let info = file.info().expect("info");
        assert_eq!(info.uploader.as_deref(), Some("Uploader"));
        assert_eq!(info.size, Some(2048));
        assert_eq!(info.width, Some(64));
        assert_eq!(info.height, Some(32));
        assert_eq!(info.mime.as_deref(), Some("image/png"));
        assert_eq!(info.repository.as_deref(), Some("local"));
        assert_eq!(
            transport.requests()[0].get("iiprop"),
            Some("timestamp|user|url|size|sha1|mime")
        );
    }

    #[test]
    fn download_writes_bytes_to_disk() {
        let (session, transport, _) = session(fast_config());
        transport.reply(imageinfo()).reply(json!("PNGDATA"));
        let mut file = File::new(&session, "Example.png").expect("file");
        file.load_info(&session).expect("info");

        let temp = tempfile::tempdir().expect("tempdir");
        let destination = temp.path().join("nested").join("Example.png");
        let written = file.download(&session, &destination).expect("download");
        assert_eq!(written, 7);
        assert_eq!(std::fs::read(&destination).expect("read"), b"PNGDATA");
        assert_eq!(
            transport.requests()[1].get("url"),
            Some("https://upload.example.org/Example.png")
        );
    }

    #[test]
    fn download_without_info_is_not_found() {
        let (session, transport, _) = session(fast_config());
        let file = File::new(&session, "Nothing.png").expect("file");
        let temp = tempfile::tempdir().expect("tempdir");
        let error = file
            .download(&session, &temp.path().join("x"))
            .expect_err("no info");
        assert!(matches!(error, WikiError::NotFound(_)));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn upload_posts_multipart_with_edit_token() {
        let (session, transport, _) = session(fast_config());
        transport
            .reply(token_reply(&[("edit", "e")]))
            .reply(json!({"upload": {"result": "Success", "filename": "Example.png"}}));
        let mut file = File::new(&session, "Example.png").expect("file");
        let request = UploadRequest {
            comment: "new version".to_string(),
            ignore_warnings: true,
            ..UploadRequest::default()
        };
        file.upload(&session, b"bytes".to_vec(), &request).expect("upload");

        assert_eq!(transport.uploads(), vec!["Example.png".to_string()]);
        let sent = &transport.requests()[1];
        assert_eq!(sent.get("action"), Some("upload"));
        assert_eq!(sent.get("filename"), Some("Example.png"));
        assert_eq!(sent.get("token"), Some("e"));
        assert_eq!(sent.get("ignorewarnings"), Some("1"));
        assert!(file.info().is_none());
    }

    #[test]
    fn upload_warning_result_is_reported() {
        let (session, transport, _) = session(fast_config());
        transport
            .reply(token_reply(&[("edit", "e")]))
            .reply(json!({"upload": {"result": "Warning", "warnings": {"exists": "Example.png"}}}));
        let mut file = File::new(&session, "Example.png").expect("file");
        let error = file
            .upload(&session, Vec::new(), &UploadRequest::default())
            .expect_err("warning");
        assert_eq!(error.code(), Some("Warning"));
    }
}
