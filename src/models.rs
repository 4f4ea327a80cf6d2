use serde::{Deserialize, Deserializer, Serialize};

pub const ANY_GENRE_ID: i32 = -1;
pub const ANY_GENRE_NAME: &str = "Any Genre";
pub const ANY_CERTIFICATION_NAME: &str = "Any Rating";
pub const ANY_CERTIFICATION_MEANING: &str = "Movies of any rating up to and including R.";
pub const ANY_CERTIFICATION_ORDER: i32 = -1;
pub const DEFAULT_SORT_KEY: &str = "popularity.desc";

const IMAGE_BASE: &str = "https://image.tmdb.org/t/p";
const POSTER_SIZE: &str = "w185";
const BACKDROP_SIZE: &str = "w780";

/// One entry of a discover result page.
///
/// Field names follow the remote JSON so the persisted snapshot and the wire format stay
/// interchangeable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub original_title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub original_language: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub overview: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genre_ids: Vec<i32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub popularity: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vote_average: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vote_count: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub adult: bool,
    #[serde(rename = "video", default, deserialize_with = "null_as_default")]
    pub has_video: bool,
}

impl Movie {
    pub fn poster_url(&self) -> Option<String> {
        self.poster_path
            .as_deref()
            .map(|p| image_url(POSTER_SIZE, p))
    }

    pub fn backdrop_url(&self) -> Option<String> {
        self.backdrop_path
            .as_deref()
            .map(|p| image_url(BACKDROP_SIZE, p))
    }

    /// Four-digit year prefix of `release_date`, if it has one.
    pub fn release_year(&self) -> Option<&str> {
        let date = self.release_date.as_deref()?;
        let year = date.split('-').next()?;
        (year.len() == 4 && year.chars().all(|c| c.is_ascii_digit())).then_some(year)
    }
}

fn image_url(size: &str, path: &str) -> String {
    format!("{IMAGE_BASE}/{size}/{}", path.trim_start_matches('/'))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i32,
    pub name: String,
}

impl Genre {
    pub fn any() -> Self {
        Genre {
            id: ANY_GENRE_ID,
            name: ANY_GENRE_NAME.to_string(),
        }
    }

    pub fn is_any(&self) -> bool {
        self.id == ANY_GENRE_ID
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certification {
    pub name: String,
    pub meaning: String,
    pub order: i32,
}

impl Certification {
    pub fn any() -> Self {
        Certification {
            name: ANY_CERTIFICATION_NAME.to_string(),
            meaning: ANY_CERTIFICATION_MEANING.to_string(),
            order: ANY_CERTIFICATION_ORDER,
        }
    }

    pub fn is_any(&self) -> bool {
        self.order == ANY_CERTIFICATION_ORDER && self.name == ANY_CERTIFICATION_NAME
    }
}

/// User-selected discover filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub certification_name: String,
    pub genre_id: i32,
    pub sort_key: String,
    pub release_year: String,
    pub restrict_to_year: bool,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        FilterCriteria {
            certification_name: ANY_CERTIFICATION_NAME.to_string(),
            genre_id: ANY_GENRE_ID,
            sort_key: DEFAULT_SORT_KEY.to_string(),
            release_year: String::new(),
            restrict_to_year: false,
        }
    }
}

impl FilterCriteria {
    pub fn is_any_certification(&self) -> bool {
        self.certification_name == ANY_CERTIFICATION_NAME
    }

    pub fn is_any_genre(&self) -> bool {
        self.genre_id == ANY_GENRE_ID
    }

    /// Genre selections are stored as text; anything non-numeric means "any genre".
    pub fn genre_from_setting(raw: &str) -> i32 {
        raw.trim().parse().unwrap_or(ANY_GENRE_ID)
    }

    /// Resets selections that the freshly fetched reference lists no longer contain.
    ///
    /// A list holding only its sentinel entry (or nothing) is treated as "not loaded yet" and
    /// leaves the matching selection alone. Returns true when anything changed.
    pub fn reconcile(&mut self, genres: &[Genre], certifications: &[Certification]) -> bool {
        let mut changed = false;
        if genres.len() > 1 && !genres.iter().any(|g| g.id == self.genre_id) {
            self.genre_id = ANY_GENRE_ID;
            changed = true;
        }
        if certifications.len() > 1
            && !certifications
                .iter()
                .any(|c| c.name == self.certification_name)
        {
            self.certification_name = ANY_CERTIFICATION_NAME.to_string();
            changed = true;
        }
        changed
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sort_key.trim().is_empty() {
            return Err("sort_key must not be empty".to_string());
        }
        if self.certification_name.trim().is_empty() {
            return Err("certification_name must not be empty".to_string());
        }
        if self.restrict_to_year && !is_four_digit_year(&self.release_year) {
            return Err(format!(
                "release_year '{}' must be four digits when restrict_to_year is set",
                self.release_year
            ));
        }
        Ok(())
    }
}

pub fn is_four_digit_year(input: &str) -> bool {
    input.len() == 4 && input.chars().all(|c| c.is_ascii_digit())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_movie() -> Movie {
        serde_json::from_value(json!({
            "id": 550,
            "title": "Fight Club",
            "poster_path": "/pB8BM7pdSp6B6Ih7QZ4DrQ3PmJK.jpg",
            "backdrop_path": null,
            "release_date": "1999-10-15"
        }))
        .expect("movie")
    }

    #[test]
    fn image_urls_use_fixed_sizes() {
        let movie = sample_movie();
        assert_eq!(
            movie.poster_url().as_deref(),
            Some("https://image.tmdb.org/t/p/w185/pB8BM7pdSp6B6Ih7QZ4DrQ3PmJK.jpg")
        );
        assert_eq!(movie.backdrop_url(), None);
    }

    #[test]
    fn missing_and_null_fields_fall_back_to_defaults() {
        let movie: Movie = serde_json::from_value(json!({
            "id": 7,
            "overview": null,
            "genre_ids": null,
            "video": true
        }))
        .expect("movie");
        assert_eq!(movie.overview, "");
        assert!(movie.genre_ids.is_empty());
        assert!(movie.has_video);
        assert_eq!(movie.release_date, None);
    }

    #[test]
    fn release_year_ignores_malformed_dates() {
        let mut movie = sample_movie();
        assert_eq!(movie.release_year(), Some("1999"));
        movie.release_date = Some("99-10-15".to_string());
        assert_eq!(movie.release_year(), None);
        movie.release_date = None;
        assert_eq!(movie.release_year(), None);
    }

    #[test]
    fn genre_setting_falls_back_to_any() {
        assert_eq!(FilterCriteria::genre_from_setting("28"), 28);
        assert_eq!(FilterCriteria::genre_from_setting(" 35 "), 35);
        assert_eq!(FilterCriteria::genre_from_setting("Action"), ANY_GENRE_ID);
        assert_eq!(FilterCriteria::genre_from_setting(""), ANY_GENRE_ID);
    }

    #[test]
    fn reconcile_resets_vanished_selections() {
        let genres = vec![
            Genre::any(),
            Genre {
                id: 28,
                name: "Action".to_string(),
            },
        ];
        let certs = vec![
            Certification::any(),
            Certification {
                name: "PG".to_string(),
                meaning: String::new(),
                order: 2,
            },
        ];
        let mut criteria = FilterCriteria {
            genre_id: 99,
            certification_name: "X".to_string(),
            ..FilterCriteria::default()
        };
        assert!(criteria.reconcile(&genres, &certs));
        assert_eq!(criteria.genre_id, ANY_GENRE_ID);
        assert_eq!(criteria.certification_name, ANY_CERTIFICATION_NAME);

        let mut kept = FilterCriteria {
            genre_id: 28,
            certification_name: "PG".to_string(),
            ..FilterCriteria::default()
        };
        assert!(!kept.reconcile(&genres, &certs));
        assert_eq!(kept.genre_id, 28);
    }

    #[test]
    fn reconcile_skips_unloaded_lists() {
        let mut criteria = FilterCriteria {
            genre_id: 99,
            ..FilterCriteria::default()
        };
        assert!(!criteria.reconcile(&[Genre::any()], &[]));
        assert_eq!(criteria.genre_id, 99);
    }

    #[test]
    fn validate_requires_year_only_when_restricted() {
        let mut criteria = FilterCriteria::default();
        assert!(criteria.validate().is_ok());
        criteria.restrict_to_year = true;
        assert!(criteria.validate().is_err());
        criteria.release_year = "2016".to_string();
        assert!(criteria.validate().is_ok());
    }
}
