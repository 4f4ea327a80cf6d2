use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::models::{Certification, Genre, Movie, ANY_CERTIFICATION_NAME, ANY_GENRE_ID};

const MARKET: &str = "US";
const EXCLUDED_GENRE: &str = "Foreign";

pub fn parse_movies(body: &[u8]) -> CatalogResult<Vec<Movie>> {
    let root = parse_root(body)?;
    let records = array_field(&root, "results")?;
    let movies = collect_records::<Movie>(records, "movie");
    debug!(count = movies.len(), "Parsed movies");
    Ok(movies)
}

/// Genre list with the synthesized "any genre" entry first and the regional genre removed.
pub fn parse_genres(body: &[u8]) -> CatalogResult<Vec<Genre>> {
    #[derive(Deserialize)]
    struct GenreRecord {
        id: i32,
        name: String,
    }

    let root = parse_root(body)?;
    let records = array_field(&root, "genres")?;
    let mut genres = vec![Genre::any()];
    genres.extend(
        collect_records::<GenreRecord>(records, "genre")
            .into_iter()
            .filter(|g| g.name != EXCLUDED_GENRE && g.id != ANY_GENRE_ID)
            .map(|g| Genre {
                id: g.id,
                name: g.name,
            }),
    );
    debug!(count = genres.len(), "Parsed genres");
    Ok(genres)
}

/// US certifications sorted by display order, "any certification" first.
pub fn parse_certifications(body: &[u8]) -> CatalogResult<Vec<Certification>> {
    #[derive(Deserialize)]
    struct CertificationRecord {
        certification: String,
        #[serde(default)]
        meaning: Option<String>,
        order: OrderValue,
    }

    let root = parse_root(body)?;
    let by_country = root
        .get("certifications")
        .and_then(|c| c.as_object())
        .ok_or_else(|| CatalogError::malformed("missing 'certifications' object"))?;
    let records = by_country
        .get(MARKET)
        .ok_or_else(|| CatalogError::malformed(format!("missing '{MARKET}' certifications")))?
        .as_array()
        .ok_or_else(|| CatalogError::malformed(format!("'{MARKET}' certifications is not an array")))?;

    let mut certifications = vec![Certification::any()];
    for record in collect_records::<CertificationRecord>(records, "certification") {
        let Some(order) = record.order.as_i32() else {
            warn!(
                "Dropping certification '{}' with non-numeric order",
                record.certification
            );
            continue;
        };
        if record.certification == ANY_CERTIFICATION_NAME {
            continue;
        }
        certifications.push(Certification {
            name: record.certification,
            meaning: record.meaning.unwrap_or_default(),
            order,
        });
    }
    // Stable: equal orders keep their response position.
    certifications.sort_by_key(|c| c.order);
    debug!(count = certifications.len(), "Parsed certifications");
    Ok(certifications)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrderValue {
    Number(i64),
    Text(String),
}

impl OrderValue {
    fn as_i32(&self) -> Option<i32> {
        match self {
            OrderValue::Number(n) => i32::try_from(*n).ok(),
            OrderValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn parse_root(body: &[u8]) -> CatalogResult<Value> {
    let root: Value = serde_json::from_slice(body)
        .map_err(|e| CatalogError::malformed(format!("invalid JSON: {e}")))?;
    if !root.is_object() {
        return Err(CatalogError::malformed("top-level JSON is not an object"));
    }
    Ok(root)
}

fn array_field<'a>(root: &'a Value, field: &str) -> CatalogResult<&'a Vec<Value>> {
    root.get(field)
        .ok_or_else(|| CatalogError::malformed(format!("missing '{field}' field")))?
        .as_array()
        .ok_or_else(|| CatalogError::malformed(format!("'{field}' is not an array")))
}

fn collect_records<T: DeserializeOwned>(records: &[Value], kind: &str) -> Vec<T> {
    records
        .iter()
        .enumerate()
        .filter_map(|(idx, record)| match T::deserialize(record) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Dropping malformed {} record at index {}: {}", kind, idx, e);
                None
            }
        })
        .collect()
}
