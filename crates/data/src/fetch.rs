/// Why a fetch did not produce data.
///
/// Not-found is typed separately from remote failure so views can render an
/// absent/empty state instead of an error banner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("not found")]
    NotFound,

    /// Transport or store-side failure; the remote message passes through
    /// verbatim.
    #[error("{0}")]
    Remote(String),

    /// The row arrived but did not deserialize into the caller's record type.
    #[error("failed to decode record: {0}")]
    Decode(String),
}

/// The {loading, error, data} triple describing an in-progress or resolved
/// read. At rest exactly one of loading / error / data is the significant
/// field; loading and a previous error/data may coexist only for the instant
/// a superseding request is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchState<T> {
    pub loading: bool,
    pub error: Option<FetchError>,
    pub data: T,
}

impl<T: Default> Default for FetchState<T> {
    fn default() -> Self {
        Self {
            loading: false,
            error: None,
            data: T::default(),
        }
    }
}
