use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Resolution tiers offered by the image host.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSize {
    #[display("w92")]
    W92,
    #[display("w154")]
    W154,
    #[display("w185")]
    W185,
    #[display("w342")]
    W342,
    #[display("w500")]
    W500,
    #[display("w780")]
    W780,
    #[display("original")]
    Original,
}
impl ImageSize {
    pub const ALL: [Self; 7] = [Self::W92, Self::W154, Self::W185, Self::W342, Self::W500, Self::W780, Self::Original];
}

#[derive(Debug, Display, Clone, PartialEq, Eq, Error)]
#[display("unknown image size: {_0}")]
pub struct UnknownSize(#[error(not(source))] pub String);

impl FromStr for ImageSize {
    type Err = UnknownSize;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|size| size.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownSize(s.to_string()))
    }
}

/// Resolve the locator of an image: `base/size/path`.
///
/// Paths from the listing API carry a leading slash and bases are commonly
/// configured with a trailing one; exactly one slash separates each part. An
/// empty path means the record has no such image, so there is nothing to
/// locate.
pub fn locator(base: &str, size: ImageSize, path: &str) -> Option<String> {
    let path = path.trim().trim_start_matches('/');
    if path.is_empty() {
        return None;
    }
    Some(format!("{}/{size}/{path}", base.trim_end_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://image.tmdb.org/t/p", ImageSize::W185, "/abc.jpg", Some("https://image.tmdb.org/t/p/w185/abc.jpg"))]
    #[case("https://image.tmdb.org/t/p/", ImageSize::Original, "/abc.jpg", Some("https://image.tmdb.org/t/p/original/abc.jpg"))]
    #[case("https://image.tmdb.org/t/p/", ImageSize::W92, "abc.jpg", Some("https://image.tmdb.org/t/p/w92/abc.jpg"))]
    #[case("https://image.tmdb.org/t/p", ImageSize::W185, "", None)]
    #[case("https://image.tmdb.org/t/p", ImageSize::W185, "/", None)]
    #[case("https://image.tmdb.org/t/p", ImageSize::W185, "  ", None)]
    fn test_locator(#[case] base: &str, #[case] size: ImageSize, #[case] path: &str, #[case] expected: Option<&str>) {
        assert_eq!(locator(base, size, path).as_deref(), expected);
    }

    #[test]
    fn test_sizes_are_distinct_keys() {
        let small = locator("https://img", ImageSize::W185, "/a.jpg");
        let large = locator("https://img", ImageSize::Original, "/a.jpg");
        assert_ne!(small, large);
    }

    #[rstest]
    #[case("w92", ImageSize::W92)]
    #[case("W500", ImageSize::W500)]
    #[case("original", ImageSize::Original)]
    #[case("ORIGINAL", ImageSize::Original)]
    fn test_from_str(#[case] input: &str, #[case] expected: ImageSize) {
        assert_eq!(input.parse::<ImageSize>().unwrap(), expected);
    }

    #[rstest]
    #[case("w100")]
    #[case("")]
    #[case("full")]
    fn test_from_str_invalid(#[case] input: &str) {
        assert_eq!(input.parse::<ImageSize>().unwrap_err(), UnknownSize(input.to_string()));
    }
}
