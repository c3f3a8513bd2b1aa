use reel_codec::{Decode, Fields, Json, Result, decode_value};

/// One page of a paginated listing.
///
/// The counters are decoded fail-soft like any other scalar field. The
/// `results` list is decoded all-or-nothing: if it is missing, is not an
/// array, or any single element fails to decode, the page is treated as
/// having no results.
#[derive(Debug, Clone, PartialEq)]
pub struct PageEnvelope<E> {
    pub page: i64,
    pub results: Vec<E>,
    pub total_pages: i64,
    pub total_results: i64,
}

impl<E> PageEnvelope<E> {
    /// Whether the listing has a page after this one.
    pub fn has_next_page(&self) -> bool {
        self.page < self.total_pages
    }
}

impl<E: Decode> Decode for PageEnvelope<E> {
    fn decode(fields: &Fields<'_>) -> Result<Self> {
        let page = fields.get("page");
        let results = match fields.raw("results") {
            Some(Json::Array(items)) => match items.iter().map(decode_value::<E>).collect::<Result<Vec<_>>>() {
                Ok(results) => results,
                Err(err) => {
                    tracing::warn!(page, error = ?err, "Discarding page results that failed to decode");
                    Vec::new()
                },
            },
            other => {
                tracing::warn!(page, present = other.is_some(), "Page envelope has no results list");
                Vec::new()
            },
        };
        Ok(Self {
            page,
            results,
            total_pages: fields.get("total_pages"),
            total_results: fields.get("total_results"),
        })
    }
}
