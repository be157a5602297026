//! AEMET OpenData API client.
//!
//! Every query answers a small JSON envelope (`estado`, `datos`,
//! `descripcion`); the actual payload sits behind the short-lived URL in
//! `datos`. An `estado` of 404 is the documented "no data for this query"
//! answer and is treated as zero active warnings, never as a failure.
//!
//! API documentation: https://opendata.aemet.es/dist/index.html

use serde::Deserialize;
use serde_json::Value;
use std::thread;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::ingest::{archive, capxml, sniff_payload, PayloadKind};
use crate::logging::{self, DataSource};
use crate::model::{FeedError, RawBulletin};
use crate::provinces;

pub const DEFAULT_BASE_URL: &str = "https://opendata.aemet.es/opendata/api";

/// National warning queries, tried in order until one yields data.
const NATIONAL_PATHS: &[&str] = &[
    "/avisos_cap/activos/area/esp",
    "/avisos_cap/ultimoelaborado/area/esp",
];

/// The endpoint that serves the elaborated CAP bundle.
const ARCHIVE_PATH: &str = "/avisos_cap/ultimoelaborado/area/esp";

fn region_path(code: &str) -> String {
    format!("/avisos_cap/ultimoelaborado/area/{}", code)
}

// ============================================================================
// Envelope protocol
// ============================================================================

/// The metadata envelope AEMET wraps every response in.
#[derive(Debug, Deserialize)]
pub struct AemetEnvelope {
    pub estado: Option<u16>,
    pub datos: Option<DatosField>,
    pub descripcion: Option<String>,
}

/// `datos` is usually a string URL but has been observed as a one-element
/// array on some endpoints.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DatosField {
    Url(String),
    Urls(Vec<String>),
}

impl DatosField {
    fn first_url(&self) -> Option<&str> {
        match self {
            DatosField::Url(url) => Some(url.as_str()),
            DatosField::Urls(urls) => urls.first().map(String::as_str),
        }
    }
}

/// What an envelope says about the payload.
#[derive(Debug, PartialEq)]
pub enum EnvelopeOutcome {
    /// Follow this URL for the payload.
    Data(String),
    /// Upstream reports zero active warnings.
    NoWarnings,
}

/// Interprets an envelope: 200 with `datos` yields the payload URL, 404
/// means no warnings, anything else is an upstream failure. Envelopes
/// without `estado` but with `datos` are accepted as data.
pub fn resolve_envelope(envelope: &AemetEnvelope) -> Result<EnvelopeOutcome, FeedError> {
    match envelope.estado {
        Some(404) => Ok(EnvelopeOutcome::NoWarnings),
        Some(200) | None => match envelope.datos.as_ref().and_then(DatosField::first_url) {
            Some(url) => Ok(EnvelopeOutcome::Data(url.to_string())),
            None => Err(FeedError::Parse("envelope carries no datos URL".to_string())),
        },
        Some(estado) => Err(FeedError::Upstream {
            estado,
            descripcion: envelope.descripcion.clone().unwrap_or_default(),
        }),
    }
}

/// Decodes a metadata envelope from its JSON body.
pub fn decode_envelope(body: &str) -> Result<AemetEnvelope, FeedError> {
    serde_json::from_str(body).map_err(|e| FeedError::Parse(format!("envelope: {}", e)))
}

// ============================================================================
// HTTP steps
// ============================================================================

/// Fetches and decodes the metadata envelope for an API path.
pub fn fetch_envelope(
    client: &reqwest::blocking::Client,
    config: &ServiceConfig,
    path: &str,
) -> Result<AemetEnvelope, FeedError> {
    let url = format!("{}{}?api_key={}", config.base_url, path, config.api_key);
    let response = client
        .get(&url)
        .header("Accept", "application/json")
        .timeout(Duration::from_secs(config.metadata_timeout_secs))
        .send()
        .map_err(|e| network_error(e, &config.api_key))?;
    if !response.status().is_success() {
        return Err(FeedError::Http(response.status().as_u16()));
    }
    let body = response
        .text()
        .map_err(|e| network_error(e, &config.api_key))?;
    decode_envelope(&body)
}

/// Fetches the payload behind a `datos` URL as raw bytes. The URL is
/// pre-signed, so no API key is attached. Payloads get the longer timeout:
/// CAP bundles run to megabytes.
pub fn fetch_payload(
    client: &reqwest::blocking::Client,
    config: &ServiceConfig,
    url: &str,
) -> Result<Vec<u8>, FeedError> {
    let response = client
        .get(url)
        .timeout(Duration::from_secs(config.payload_timeout_secs))
        .send()
        .map_err(|e| network_error(e, &config.api_key))?;
    if !response.status().is_success() {
        return Err(FeedError::Http(response.status().as_u16()));
    }
    let bytes = response
        .bytes()
        .map_err(|e| network_error(e, &config.api_key))?;
    Ok(bytes.to_vec())
}

fn network_error(err: reqwest::Error, api_key: &str) -> FeedError {
    FeedError::Network(mask_key(&err.to_string(), api_key))
}

/// Scrubs the API key out of anything that could reach logs or status
/// messages (reqwest errors echo the full request URL).
pub(crate) fn mask_key(text: &str, api_key: &str) -> String {
    if api_key.is_empty() {
        text.to_string()
    } else {
        text.replace(api_key, "***")
    }
}

// ============================================================================
// Payload decoding
// ============================================================================

/// Turns a payload into bulletins according to what its bytes say it is.
/// `region_hint` is attached to every bulletin that does not carry its own
/// province field.
fn bulletins_from_payload(
    bytes: &[u8],
    region_hint: Option<&str>,
    origin: &str,
) -> Result<Vec<RawBulletin>, FeedError> {
    match sniff_payload(bytes) {
        PayloadKind::Json => {
            let body: Value = serde_json::from_slice(bytes)
                .map_err(|e| FeedError::Parse(format!("{}: {}", origin, e)))?;
            match body {
                Value::Array(items) => Ok(bulletins_from_items(&items, region_hint)),
                _ => Err(FeedError::Parse(format!(
                    "{}: expected a JSON array",
                    origin
                ))),
            }
        }
        PayloadKind::Xml => {
            let text = archive::decode_text(bytes);
            let mut bulletins = capxml::extract_entries(&text, None);
            if let Some(hint) = region_hint {
                for bulletin in &mut bulletins {
                    if bulletin.province_hint.is_none() {
                        bulletin.province_hint = Some(hint.to_string());
                    }
                }
            }
            Ok(bulletins)
        }
        PayloadKind::Gzip | PayloadKind::Tar => bulletins_from_archive(bytes),
        PayloadKind::Unknown => Err(FeedError::Parse(format!(
            "{}: unrecognized payload",
            origin
        ))),
    }
}

fn bulletins_from_items(items: &[Value], region_hint: Option<&str>) -> Vec<RawBulletin> {
    items
        .iter()
        .filter_map(|item| bulletin_from_item(item, region_hint))
        .collect()
}

/// Builds one bulletin from a JSON alert object. The level/event fields
/// become the title, descriptive fields the summary; objects with none of
/// the known fields contribute every string value they hold. Objects with
/// no text at all are dropped.
fn bulletin_from_item(item: &Value, region_hint: Option<&str>) -> Option<RawBulletin> {
    let field = |key: &str| -> Option<&str> {
        item.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let title = [field("nivel"), field("evento")]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    let mut summary = [
        field("fenomeno"),
        field("descripcion"),
        field("zona"),
        field("areaDesc"),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");

    if title.is_empty() && summary.is_empty() {
        summary = match item {
            Value::String(s) => s.trim().to_string(),
            Value::Object(map) => map
                .values()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            _ => String::new(),
        };
    }
    if title.is_empty() && summary.is_empty() {
        return None;
    }

    let hint = field("provincia")
        .or_else(|| field("cod"))
        .and_then(|code| provinces::find_province(code).map(|p| p.code))
        .or(region_hint);

    Some(RawBulletin {
        title,
        summary,
        province_hint: hint.map(String::from),
        source_file: None,
    })
}

/// Unpacks a CAP bundle and flattens every file into bulletins. Unreadable
/// files are skipped and tallied; an empty bundle is zero warnings. The
/// scratch directory is removed when this function returns, on every path.
fn bulletins_from_archive(bytes: &[u8]) -> Result<Vec<RawBulletin>, FeedError> {
    let scratch = archive::unpack_to_scratch(bytes)?;
    let files = archive::collect_cap_files(scratch.path());
    if files.is_empty() {
        logging::warn(DataSource::Aemet, None, "CAP bundle contained no CAP files");
        return Ok(Vec::new());
    }
    let mut bulletins = Vec::new();
    let mut skipped = 0usize;
    for path in &files {
        let Some(text) = archive::read_cap_file(path) else {
            skipped += 1;
            continue;
        };
        let file_name = path.file_name().and_then(|n| n.to_str());
        let entries = capxml::extract_entries(&text, file_name);
        if entries.is_empty() {
            skipped += 1;
            continue;
        }
        bulletins.extend(entries);
    }
    if skipped > 0 {
        logging::warn(
            DataSource::Aemet,
            None,
            &format!(
                "{} of {} CAP files yielded no bulletins",
                skipped,
                files.len()
            ),
        );
    }
    Ok(bulletins)
}

// ============================================================================
// Retrieval strategies
// ============================================================================

/// Polls every registry area's scoped endpoint and collects bulletins.
///
/// One region failing is isolated: that area contributes nothing (it stays
/// green in the reduction) and the loop continues. Only when every region
/// fails does the fetch as a whole fail. Requests are spaced by
/// `region_delay_ms` to stay inside upstream rate limits.
pub fn fetch_per_region(
    client: &reqwest::blocking::Client,
    config: &ServiceConfig,
) -> Result<Vec<RawBulletin>, FeedError> {
    let codes = provinces::all_codes();
    let total = codes.len();
    logging::info(
        DataSource::Aemet,
        None,
        &format!("polling {} region endpoints", total),
    );

    let mut bulletins = Vec::new();
    let mut failures = 0usize;
    let mut last_error: Option<FeedError> = None;
    for (i, code) in codes.into_iter().enumerate() {
        if i > 0 && config.region_delay_ms > 0 {
            thread::sleep(Duration::from_millis(config.region_delay_ms));
        }
        match fetch_region(client, config, code) {
            Ok(mut region_bulletins) => bulletins.append(&mut region_bulletins),
            Err(err) => {
                logging::log_feed_failure(Some(code), "region fetch", &err);
                failures += 1;
                last_error = Some(err);
            }
        }
    }
    if failures == total {
        return Err(last_error
            .unwrap_or_else(|| FeedError::Network("every region fetch failed".to_string())));
    }
    Ok(bulletins)
}

/// One region-scoped query. The documented response is a bare JSON array,
/// but the envelope indirection shows up on some deployments; both are
/// accepted. A plain HTTP 404 means no bulletin is published for the area.
fn fetch_region(
    client: &reqwest::blocking::Client,
    config: &ServiceConfig,
    code: &str,
) -> Result<Vec<RawBulletin>, FeedError> {
    let url = format!(
        "{}{}?api_key={}",
        config.base_url,
        region_path(code),
        config.api_key
    );
    let response = client
        .get(&url)
        .header("Accept", "application/json")
        .timeout(Duration::from_secs(config.metadata_timeout_secs))
        .send()
        .map_err(|e| network_error(e, &config.api_key))?;
    if response.status().as_u16() == 404 {
        return Ok(Vec::new());
    }
    if !response.status().is_success() {
        return Err(FeedError::Http(response.status().as_u16()));
    }
    let bytes = response
        .bytes()
        .map_err(|e| network_error(e, &config.api_key))?;

    let body: Value = serde_json::from_slice(&bytes)
        .map_err(|e| FeedError::Parse(format!("region {}: {}", code, e)))?;
    match body {
        Value::Array(items) => Ok(bulletins_from_items(&items, Some(code))),
        Value::Object(_) => {
            let envelope: AemetEnvelope = serde_json::from_value(body)
                .map_err(|e| FeedError::Parse(format!("region {} envelope: {}", code, e)))?;
            match resolve_envelope(&envelope)? {
                EnvelopeOutcome::NoWarnings => Ok(Vec::new()),
                EnvelopeOutcome::Data(data_url) => {
                    let payload = fetch_payload(client, config, &data_url)?;
                    bulletins_from_payload(&payload, Some(code), &format!("region {}", code))
                }
            }
        }
        _ => Err(FeedError::Parse(format!(
            "region {}: body is neither array nor envelope",
            code
        ))),
    }
}

/// Fetches the national feed, trying each endpoint in order. A hard-failing
/// endpoint is logged and the next one tried; an endpoint reporting zero
/// warnings counts as a valid answer once no later endpoint has data.
pub fn fetch_national(
    client: &reqwest::blocking::Client,
    config: &ServiceConfig,
) -> Result<Vec<RawBulletin>, FeedError> {
    let mut saw_no_warnings = false;
    let mut last_error: Option<FeedError> = None;
    for path in NATIONAL_PATHS {
        match fetch_national_path(client, config, path) {
            Ok(Some(bulletins)) => return Ok(bulletins),
            Ok(None) => saw_no_warnings = true,
            Err(err) => {
                logging::log_feed_failure(None, &format!("national fetch {}", path), &err);
                last_error = Some(err);
            }
        }
    }
    if saw_no_warnings {
        return Ok(Vec::new());
    }
    Err(last_error
        .unwrap_or_else(|| FeedError::Network("no national endpoint answered".to_string())))
}

fn fetch_national_path(
    client: &reqwest::blocking::Client,
    config: &ServiceConfig,
    path: &str,
) -> Result<Option<Vec<RawBulletin>>, FeedError> {
    let envelope = fetch_envelope(client, config, path)?;
    match resolve_envelope(&envelope)? {
        EnvelopeOutcome::NoWarnings => Ok(None),
        EnvelopeOutcome::Data(url) => {
            let payload = fetch_payload(client, config, &url)?;
            Ok(Some(bulletins_from_payload(&payload, None, path)?))
        }
    }
}

/// Fetches the elaborated CAP bundle. The payload is expected to be a
/// tar.gz; anything else is logged and decoded by sniff as a degraded path.
pub fn fetch_archived(
    client: &reqwest::blocking::Client,
    config: &ServiceConfig,
) -> Result<Vec<RawBulletin>, FeedError> {
    let envelope = fetch_envelope(client, config, ARCHIVE_PATH)?;
    match resolve_envelope(&envelope)? {
        EnvelopeOutcome::NoWarnings => Ok(Vec::new()),
        EnvelopeOutcome::Data(url) => {
            let payload = fetch_payload(client, config, &url)?;
            match sniff_payload(&payload) {
                PayloadKind::Gzip | PayloadKind::Tar => bulletins_from_archive(&payload),
                other => {
                    logging::warn(
                        DataSource::Aemet,
                        None,
                        &format!("expected CAP bundle, payload sniffed as {:?}", other),
                    );
                    bulletins_from_payload(&payload, None, ARCHIVE_PATH)
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
