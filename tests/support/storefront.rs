//! A fake storefront mounted on a wiremock server.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ACCOUNT: &str = "somefan";
pub const FAN_ID: u64 = 4242;

/// One purchased release served by the fake storefront.
#[derive(Debug, Clone)]
pub struct FakeRelease {
    pub sale_item_id: &'static str,
    pub sitem: u64,
    pub title: &'static str,
    pub artist: &'static str,
    pub release_date: &'static str,
    pub single_track: bool,
    pub art_id: u64,
    pub formats: &'static [&'static str],
}

impl FakeRelease {
    pub fn album(sale_item_id: &'static str, sitem: u64, title: &'static str) -> Self {
        Self {
            sale_item_id,
            sitem,
            title,
            artist: "The Testers",
            release_date: "08 Jan 2021 00:00:00 GMT",
            single_track: false,
            art_id: 1000 + sitem,
            formats: &["flac", "vorbis"],
        }
    }

    pub fn track(sale_item_id: &'static str, sitem: u64, title: &'static str) -> Self {
        Self {
            single_track: true,
            ..Self::album(sale_item_id, sitem, title)
        }
    }

    pub fn slug(&self) -> String {
        format!("release{}", self.sitem)
    }

    pub fn redownload_url(&self, server: &MockServer) -> String {
        format!(
            "{}/download?from=collection&payment_id=9{}&sitem_id={}",
            server.uri(),
            self.sitem,
            self.sitem
        )
    }

    pub fn digital_item(&self, server: &MockServer) -> Value {
        let downloads: serde_json::Map<String, Value> = self
            .formats
            .iter()
            .map(|format| {
                (
                    (*format).to_string(),
                    json!({ "url": format!("{}/download/{}?enc={format}", server.uri(), self.slug()) }),
                )
            })
            .collect();
        json!({
            "title": self.title,
            "artist": self.artist,
            "package_release_date": self.release_date,
            "download_type": if self.single_track { "t" } else { "a" },
            "art_id": self.art_id,
            "downloads": downloads,
        })
    }
}

/// Escapes a value for a double-quoted HTML attribute.
pub fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// An HTML page carrying `blob` the way storefront pages do.
pub fn pagedata_page(title: &str, blob: &Value) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>{title}</title></head><body>\
         <div id=\"pagedata\" data-blob=\"{}\"></div></body></html>",
        escape_attr(&blob.to_string())
    )
}

/// The JavaScript callback wrapping a stat-download answer.
pub fn stat_callback(download_url: &str) -> String {
    format!(
        "if ( window.Downloads ) {{ Downloads.statResult ( {} ) }};",
        json!({ "result": "ok", "download_url": download_url })
    )
}

/// A ZIP archive holding `entries`.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// The fan page blob listing `releases`, with `extra` merged on top.
pub fn fan_blob(server: &MockServer, releases: &[FakeRelease], extra: Value) -> Value {
    let urls: serde_json::Map<String, Value> = releases
        .iter()
        .map(|r| (r.sale_item_id.to_string(), Value::String(r.redownload_url(server))))
        .collect();
    let mut blob = json!({
        "fan_data": { "fan_id": FAN_ID },
        "collection_data": {
            "batch_size": 20,
            "item_count": releases.len(),
            "last_token": "1600000000:1:a::",
            "redownload_urls": urls,
        },
        "item_cache": { "collection": {}, "hidden": {} },
    });
    if let (Some(target), Value::Object(extra)) = (blob.as_object_mut(), extra) {
        for (key, value) in extra {
            target.insert(key, value);
        }
    }
    blob
}

/// Serves the fan page of [`ACCOUNT`].
pub async fn mount_fan_page(server: &MockServer, blob: &Value) {
    Mock::given(method("GET"))
        .and(path(format!("/{ACCOUNT}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(pagedata_page("Some Fan's music | Bandcamp", blob)),
        )
        .mount(server)
        .await;
}

/// Serves the download page, stat endpoint, payload and cover of `release`.
pub async fn mount_release(server: &MockServer, release: &FakeRelease) {
    let page = pagedata_page(
        "Download",
        &json!({ "digital_items": [release.digital_item(server)] }),
    );
    Mock::given(method("GET"))
        .and(path("/download"))
        .and(query_param("sitem_id", release.sitem.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(server)
        .await;

    let payload_path = if release.single_track {
        format!("/files/{}.flac", release.slug())
    } else {
        format!("/files/{}.zip", release.slug())
    };
    Mock::given(method("GET"))
        .and(path(format!("/statdownload/{}", release.slug())))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(stat_callback(&format!("{}{payload_path}", server.uri()))),
        )
        .mount(server)
        .await;

    let payload = if release.single_track {
        b"fLaC single track".to_vec()
    } else {
        zip_bytes(&[
            ("01 - Opening.flac", b"fLaC one"),
            ("02 - Closing.flac", b"fLaC two"),
        ])
    };
    Mock::given(method("GET"))
        .and(path(payload_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/img/a{}_10", release.art_id)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"JPEG".to_vec()))
        .mount(server)
        .await;
}

/// Writes a JSON cookies export into `dir`.
pub fn write_cookies_file(dir: &Path) -> PathBuf {
    let path = dir.join("cookies.json");
    std::fs::write(
        &path,
        r#"[{"Name raw": "identity", "Content raw": "secret-identity"},
            {"Name raw": "session", "Content raw": "secret-session"}]"#,
    )
    .unwrap();
    path
}
