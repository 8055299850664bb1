use thiserror::Error;

/// Failures that abort a backup session.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("authentication failed; check EMAIL and PASSWORD")]
    Authentication,

    #[error("no books found in the account catalog")]
    EmptyCatalog,

    #[error("could not open the selected book")]
    Selection(#[source] anyhow::Error),

    #[error("could not open the book viewer")]
    ViewerUnavailable(#[source] anyhow::Error),

    #[error("could not switch the viewer to {layout} page layout")]
    Layout {
        layout: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("no pages were captured")]
    NoPagesCaptured,

    #[error("output action failed: {0}")]
    Output(&'static str),
}
