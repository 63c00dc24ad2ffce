//! CLI arguments, server settings and the URL template table.

use std::collections::HashMap;
use std::fs;

use clap::Parser;

use crate::error::ServerError;

const KEY_HTTP_VERSION: &str = "sv.version";
const KEY_SERVER_NAME: &str = "sv.name";
const KEY_HOST: &str = "sv.host";
const KEY_PORT: &str = "sv.port";
const KEY_FILE_SYSTEM: &str = "path.files.system";
const KEY_METADATA: &str = "path.files.metadata";
const KEY_URL_TEMPLATES: &str = "path.files.structure.urls";
const KEY_METADATA_ID_FIELD: &str = "metadata.field.id";
const KEY_METADATA_DATA_FIELD: &str = "metadata.field.data";

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "filedepot", about = "HTTP file-management server")]
pub struct Args {
    #[arg(
        short = 'c',
        long,
        env = "FILEDEPOT_CONFIG",
        default_value = "config/filedepot.properties",
        help = "Path to the server properties file"
    )]
    pub config: String,
}

/// Frozen server settings, loaded once at startup from a properties file.
#[derive(Clone, Debug)]
pub struct Settings {
    pub http_version: String,
    pub server_name: String,
    pub host: String,
    pub port: u16,
    /// Directory holding the managed files.
    pub file_dir: String,
    pub metadata_path: String,
    pub templates_path: String,
    /// JSON key of the id counter in the metadata file.
    pub metadata_id_field: String,
    /// JSON key of the entry map in the metadata file.
    pub metadata_data_field: String,
}

impl Settings {
    /// Load and validate the settings file. Every key is required.
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let text = fs::read_to_string(path).map_err(|err| {
            ServerError::config(format!("failed to read properties file '{path}': {err}"))
        })?;
        let properties = parse_properties(&text);
        let require = |key: &str| {
            properties.get(key).cloned().ok_or_else(|| {
                ServerError::config(format!("missing required property '{key}' in '{path}'"))
            })
        };

        let raw_port = require(KEY_PORT)?;
        let port: u16 = raw_port.parse().map_err(|_| {
            ServerError::config(format!("'{raw_port}' is not a valid port number"))
        })?;

        Ok(Self {
            http_version: require(KEY_HTTP_VERSION)?,
            server_name: require(KEY_SERVER_NAME)?,
            host: require(KEY_HOST)?,
            port,
            file_dir: require(KEY_FILE_SYSTEM)?,
            metadata_path: require(KEY_METADATA)?,
            templates_path: require(KEY_URL_TEMPLATES)?,
            metadata_id_field: require(KEY_METADATA_ID_FIELD)?,
            metadata_data_field: require(KEY_METADATA_DATA_FIELD)?,
        })
    }
}

/// `key=value` lines; blank lines and `#`/`!` comments are skipped.
fn parse_properties(text: &str) -> HashMap<String, String> {
    let mut properties = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            properties.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    properties
}

/// Endpoint root -> method name -> ordered template strings.
pub type TemplateTable = HashMap<String, HashMap<String, Vec<String>>>;

/// Load the URL template table from its JSON file.
pub fn load_templates(path: &str) -> Result<TemplateTable, ServerError> {
    let text = fs::read_to_string(path).map_err(|err| {
        ServerError::config(format!("failed to read template file '{path}': {err}"))
    })?;
    serde_json::from_str(&text).map_err(|err| {
        ServerError::config(format!("failed to parse template file '{path}': {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "\
# server
sv.version=HTTP/1.1
sv.name=filedepot
sv.host=127.0.0.1
sv.port=8080
path.files.system=data/files
path.files.metadata=data/files_metadata.json
path.files.structure.urls=config/url_templates.json
metadata.field.id=currentId
metadata.field.data=data
";

    fn write_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[test]
    fn loads_all_required_properties() {
        let file = write_file(SAMPLE);
        let settings = Settings::load(file.path().to_str().unwrap()).expect("settings");

        assert_eq!(settings.http_version, "HTTP/1.1");
        assert_eq!(settings.server_name, "filedepot");
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.metadata_id_field, "currentId");
        assert_eq!(settings.metadata_data_field, "data");
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let file = write_file("sv.version=HTTP/1.1\n");
        let err = Settings::load(file.path().to_str().unwrap()).expect_err("missing keys");
        assert!(matches!(err, ServerError::Config { .. }));
    }

    #[test]
    fn invalid_port_is_a_config_error() {
        let file = write_file(&SAMPLE.replace("sv.port=8080", "sv.port=eighty"));
        let err = Settings::load(file.path().to_str().unwrap()).expect_err("bad port");
        assert!(matches!(err, ServerError::Config { .. }));
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let properties = parse_properties("# comment\n! other\n\n a = b \n");
        assert_eq!(properties.get("a").map(String::as_str), Some("b"));
        assert_eq!(properties.len(), 1);
    }

    #[test]
    fn template_table_parses_nested_layout() {
        let file = write_file(
            r#"{ "/files": { "GET": ["/files/id/{id}?action=view"], "POST": ["/files/upload"] } }"#,
        );
        let table = load_templates(file.path().to_str().unwrap()).expect("templates");
        let files = table.get("/files").expect("endpoint");
        assert_eq!(files.get("POST").map(Vec::len), Some(1));
    }
}
