use derive_more::Display;
use reel_codec::{Decode, Entity, Field, Fields, Kind, Result};
use serde::Serialize;
use std::str::FromStr;

/// Languages the catalogue distinguishes. Any other code is still stored
/// verbatim in [`Movie::original_language`].
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum OriginalLanguage {
    #[display("en")]
    En,
    #[display("es")]
    Es,
    #[display("pt")]
    Pt,
}
impl FromStr for OriginalLanguage {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "en" => Ok(Self::En),
            "es" => Ok(Self::Es),
            "pt" => Ok(Self::Pt),
            _ => Err(()),
        }
    }
}

/// One listing record.
///
/// Equality is identity equality: two movies are equal when their ids are,
/// whatever their other fields hold.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Movie {
    pub adult: bool,
    pub backdrop_path: String,
    pub id: Option<i64>,
    pub original_language: String,
    pub original_title: String,
    pub overview: String,
    pub popularity: f64,
    pub poster_path: String,
    pub release_date: String,
    pub title: String,
    pub video: bool,
    pub vote_average: f64,
    pub vote_count: i64,
    /// Downloaded poster, attached by hydration.
    #[serde(with = "reel_codec::blob")]
    pub poster_data: Option<Vec<u8>>,
    /// Downloaded backdrop, attached by hydration.
    #[serde(with = "reel_codec::blob")]
    pub backdrop_data: Option<Vec<u8>>,
}

impl Movie {
    pub fn original_language_value(&self) -> Option<OriginalLanguage> {
        self.original_language.parse().ok()
    }
}

impl PartialEq for Movie {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Decode for Movie {
    fn decode(fields: &Fields<'_>) -> Result<Self> {
        Ok(Self {
            adult: fields.get("adult"),
            backdrop_path: fields.get("backdrop_path"),
            id: fields.optional("id"),
            original_language: fields.get("original_language"),
            original_title: fields.get("original_title"),
            overview: fields.get("overview"),
            popularity: fields.get("popularity"),
            poster_path: fields.get("poster_path"),
            release_date: fields.get("release_date"),
            title: fields.get("title"),
            video: fields.get("video"),
            vote_average: fields.get("vote_average"),
            vote_count: fields.get("vote_count"),
            poster_data: fields.blob("poster_data")?,
            backdrop_data: fields.blob("backdrop_data")?,
        })
    }
}

impl Entity for Movie {
    const NAME: &'static str = "MovieModel";
    const FIELDS: &'static [Field] = &[
        Field::new("adult", Kind::Bool),
        Field::new("backdrop_path", Kind::Text),
        Field::new("id", Kind::Int),
        Field::new("original_language", Kind::Text),
        Field::new("original_title", Kind::Text),
        Field::new("overview", Kind::Text),
        Field::new("popularity", Kind::Float),
        Field::new("poster_path", Kind::Text),
        Field::new("release_date", Kind::Text),
        Field::new("title", Kind::Text),
        Field::new("video", Kind::Bool),
        Field::new("vote_average", Kind::Float),
        Field::new("vote_count", Kind::Int),
        Field::new("poster_data", Kind::Blob),
        Field::new("backdrop_data", Kind::Blob),
    ];

    fn id(&self) -> Option<i64> {
        self.id
    }
}

/// Membership marker of the liked set: present means liked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LikedMovie {
    pub id: Option<i64>,
}
impl LikedMovie {
    pub fn new(id: i64) -> Self {
        Self { id: Some(id) }
    }
}

impl Decode for LikedMovie {
    fn decode(fields: &Fields<'_>) -> Result<Self> {
        Ok(Self {
            id: fields.optional("id"),
        })
    }
}

impl Entity for LikedMovie {
    const NAME: &'static str = "LikedMovieModel";
    const FIELDS: &'static [Field] = &[Field::new("id", Kind::Int)];

    fn id(&self) -> Option<i64> {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_codec::{decode_value, entity_name, flatten, unflatten};
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_decode_drifting_listing() {
        let wire = json!({
            "adult": "false",
            "backdrop_path": "/back.jpg",
            "id": "550",
            "original_language": "en",
            "original_title": "Fight Club",
            "overview": "An insomniac office worker...",
            "popularity": "61.4",
            "poster_path": "/poster.jpg",
            "release_date": "1999-10-15",
            "title": "Fight Club",
            "video": 0,
            "vote_average": 8,
            "vote_count": 26280.0,
            "genre_ids": [18, 53],
        });
        let movie: Movie = decode_value(&wire).unwrap();
        assert_eq!(movie.id, Some(550));
        assert!(!movie.adult);
        assert!(!movie.video);
        assert_eq!(movie.popularity, 61.4);
        assert_eq!(movie.vote_average, 8.0);
        assert_eq!(movie.vote_count, 26280);
        assert_eq!(movie.poster_data, None);
        assert_eq!(movie.original_language_value(), Some(OriginalLanguage::En));
    }

    #[test]
    fn test_decode_rejects_malformed_artwork() {
        let wire = json!({"id": 1, "poster_data": "!!not base64!!"});
        assert!(decode_value::<Movie>(&wire).is_err());
    }

    #[rstest]
    #[case("en", Some(OriginalLanguage::En))]
    #[case("es", Some(OriginalLanguage::Es))]
    #[case("pt", Some(OriginalLanguage::Pt))]
    #[case("fr", None)]
    #[case("", None)]
    fn test_original_language_value(#[case] code: &str, #[case] expected: Option<OriginalLanguage>) {
        let movie = Movie {
            original_language: code.to_string(),
            ..Movie::default()
        };
        assert_eq!(movie.original_language_value(), expected);
    }

    #[test]
    fn test_identity_equality() {
        let a = Movie {
            id: Some(1),
            title: "A".to_string(),
            ..Movie::default()
        };
        let b = Movie {
            id: Some(1),
            title: "B".to_string(),
            ..Movie::default()
        };
        assert_eq!(a, b);
        assert!(a.same_identity(&b));
        assert!(!Movie::default().same_identity(&Movie::default()));
    }

    #[test]
    fn test_flatten_keeps_artwork_bytes() {
        let movie = Movie {
            id: Some(9),
            title: "Nine".to_string(),
            poster_data: Some(vec![0xFF, 0xD8, 0xFF]),
            ..Movie::default()
        };
        let record = flatten(&movie).unwrap();
        assert_eq!(record.get("poster_data"), Some(&reel_codec::Value::Blob(vec![0xFF, 0xD8, 0xFF])));
        assert_eq!(record.get("backdrop_data"), Some(&reel_codec::Value::Null));
        let restored: Movie = unflatten(&record).unwrap();
        assert_eq!(restored.title, "Nine");
        assert_eq!(restored.poster_data, movie.poster_data);
    }

    #[test]
    fn test_storage_names() {
        assert_eq!(entity_name::<Movie>(), "MovieEntity");
        assert_eq!(entity_name::<LikedMovie>(), "LikedMovieEntity");
    }
}
