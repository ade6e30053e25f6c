pub mod answer;
pub mod api;

pub use answer::{AnswerResult, Citation, CitationMarker, RawAnswer};
pub use api::{
    ErrorResponse, QueuedNotice, SearchData, SearchRequest, SourceDto, StatusResponse,
    SuccessResponse,
};
