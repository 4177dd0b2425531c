//! A fake Firefox configuration folder with per-profile cookie stores.

use std::path::Path;

use sqlx::Connection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};

/// Writes `profiles.ini` listing one relative profile per `(folder, identity)`
/// pair, in order, each holding a storefront `identity` cookie.
pub async fn write_firefox_profiles(firefox_dir: &Path, profiles: &[(&str, &str)]) {
    let mut ini = String::new();
    for (index, (folder, identity)) in profiles.iter().enumerate() {
        ini.push_str(&format!("[Profile{index}]\nIsRelative=1\nPath={folder}\n\n"));
        let profile = firefox_dir.join(folder);
        std::fs::create_dir_all(&profile).unwrap();
        write_cookie_store(&profile.join("cookies.sqlite"), identity).await;
    }
    std::fs::write(firefox_dir.join("profiles.ini"), ini).unwrap();
}

async fn write_cookie_store(path: &Path, identity: &str) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
    sqlx::query(
        "CREATE TABLE moz_cookies (id INTEGER PRIMARY KEY, originAttributes TEXT NOT NULL DEFAULT '', \
         name TEXT, value TEXT, host TEXT, path TEXT, expiry INTEGER)",
    )
    .execute(&mut conn)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO moz_cookies (name, value, host, path, expiry) \
         VALUES ('identity', ?, '.bandcamp.com', '/', ?)",
    )
    .bind(identity)
    .bind(chrono::Utc::now().timestamp() + 3600)
    .execute(&mut conn)
    .await
    .unwrap();
    conn.close().await.unwrap();
}
