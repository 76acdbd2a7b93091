// tests/config_load.rs
use std::{env, fs};

use topic_feed_proxy::config::{
    ENV_CACHE_BUCKET_SECS, ENV_CONFIG_PATH, ENV_FETCH_TIMEOUT_SECS, ENV_LINK_FILTER,
    ENV_PUBLIC_URL, ENV_SOURCE_URLS, ENV_WRAP_PREVIEW,
};
use topic_feed_proxy::AppConfig;

const ALL_ENV: [&str; 7] = [
    ENV_CONFIG_PATH,
    ENV_SOURCE_URLS,
    ENV_LINK_FILTER,
    ENV_PUBLIC_URL,
    ENV_FETCH_TIMEOUT_SECS,
    ENV_CACHE_BUCKET_SECS,
    ENV_WRAP_PREVIEW,
];

fn clear_env() {
    for key in ALL_ENV {
        env::remove_var(key);
    }
}

#[test]
fn parse_toml_and_json_paths() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("feed_proxy.toml");
    fs::write(
        &p_toml,
        r#"
source_urls = ["https://a.example/rss"]
link_filter = "/syria/"
cache_bucket_secs = 0
"#,
    )
    .unwrap();
    let t = AppConfig::load_from(&p_toml).unwrap();
    assert_eq!(t.source_urls, vec!["https://a.example/rss".to_string()]);
    assert_eq!(t.link_filter, "/syria/");
    assert_eq!(t.cache_bucket_secs, 0);
    assert_eq!(t.fetch_timeout_secs, 10);

    let p_json = dir.path().join("feed_proxy.json");
    fs::write(&p_json, r#"{"wrap_preview_in_paragraph": true, "max_age_secs": 60}"#).unwrap();
    let j = AppConfig::load_from(&p_json).unwrap();
    assert!(j.wrap_preview_in_paragraph);
    assert_eq!(j.max_age_secs, 60);
    assert_eq!(j.link_filter, "/iraq/");
}

#[test]
fn broken_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("feed_proxy.toml");
    fs::write(&p, "source_urls = [").unwrap();
    assert!(AppConfig::load_from(&p).is_err());
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // Isolate CWD so the repo's own config/ is not read
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    // 1) Nothing on disk -> built-in defaults
    let d = AppConfig::load_default().unwrap();
    assert_eq!(d, AppConfig::default());

    // 2) ./config/feed_proxy.toml
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("feed_proxy.toml"), r#"link_filter = "/kurdistan/""#).unwrap();
    assert_eq!(AppConfig::load_default().unwrap().link_filter, "/kurdistan/");

    // 3) Explicit path wins over the fallback
    let p_env = tmp.path().join("custom.json");
    fs::write(&p_env, r#"{"link_filter": "/basra/"}"#).unwrap();
    env::set_var(ENV_CONFIG_PATH, p_env.display().to_string());
    assert_eq!(AppConfig::load_default().unwrap().link_filter, "/basra/");

    // 4) Explicit path that does not exist is an error
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
    assert!(AppConfig::load_default().is_err());

    clear_env();
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn env_overrides_apply_on_top() {
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    env::set_var(ENV_SOURCE_URLS, " https://a.example/rss , ,https://b.example/feed ");
    env::set_var(ENV_LINK_FILTER, "/mosul/");
    env::set_var(ENV_PUBLIC_URL, "https://proxy.example.net/");
    env::set_var(ENV_FETCH_TIMEOUT_SECS, "3");
    env::set_var(ENV_CACHE_BUCKET_SECS, "not-a-number");
    env::set_var(ENV_WRAP_PREVIEW, "TRUE");

    let cfg = AppConfig::load_default().unwrap();
    assert_eq!(
        cfg.source_urls,
        vec![
            "https://a.example/rss".to_string(),
            "https://b.example/feed".to_string()
        ]
    );
    assert_eq!(cfg.link_filter, "/mosul/");
    assert_eq!(cfg.public_url.as_deref(), Some("https://proxy.example.net/"));
    assert_eq!(cfg.fetch_timeout_secs, 3);
    assert_eq!(cfg.cache_bucket_secs, 300, "unparsable value keeps the default");
    assert!(cfg.wrap_preview_in_paragraph);

    // Zero timeout fails validation
    env::set_var(ENV_FETCH_TIMEOUT_SECS, "0");
    assert!(AppConfig::load_default().is_err());

    clear_env();
    env::set_current_dir(&old).unwrap();
}
