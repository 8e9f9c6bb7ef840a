//! Classify gateway failures as transient (retry) or permanent (propagate).
//!
//! The only signal available is the error text, so classification is a
//! substring search over the lowercased message against two marker sets.
//! Non-transient markers always win.

use super::error::GatewayFailure;

/// Markers that identify a failure worth retrying.
pub const DEFAULT_TRANSIENT_MARKERS: &[&str] = &[
    "connect call failed",
    "connection refused",
    "connection reset",
    "connection aborted",
    "errno 111",
    "econnrefused",
    "did not receive a valid http response",
    "no route to host",
    "network is unreachable",
    "host is down",
    "name or service not known",
    "temporarily unavailable",
    "timed out",
    "received 1012",
    "service restart",
];

/// Markers that identify a failure that will not go away by retrying.
pub const DEFAULT_NON_TRANSIENT_MARKERS: &[&str] = &[
    "unsupported file",
    "unauthorized",
    "forbidden",
    "authentication failed",
    "invalid request",
    "bad request",
];

/// Ordered set of lowercase substrings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerSet {
    markers: Vec<String>,
}

impl MarkerSet {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        set.extend(markers);
        set
    }

    /// Append markers, lowercased. Empty and duplicate markers are skipped.
    pub fn extend<I, S>(&mut self, markers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for m in markers {
            let m = m.as_ref().trim().to_lowercase();
            if !m.is_empty() && !self.markers.contains(&m) {
                self.markers.push(m);
            }
        }
    }

    /// True when any marker occurs in `haystack` (expected lowercase).
    pub fn matches(&self, haystack: &str) -> bool {
        self.markers.iter().any(|m| haystack.contains(m.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.markers.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

/// Decides whether a caught gateway failure should be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClassifier {
    transient: MarkerSet,
    non_transient: MarkerSet,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            transient: MarkerSet::new(DEFAULT_TRANSIENT_MARKERS),
            non_transient: MarkerSet::new(DEFAULT_NON_TRANSIENT_MARKERS),
        }
    }
}

impl ErrorClassifier {
    pub fn new(transient: MarkerSet, non_transient: MarkerSet) -> Self {
        Self {
            transient,
            non_transient,
        }
    }

    /// Replace the transient marker set.
    pub fn with_transient_markers(mut self, markers: MarkerSet) -> Self {
        self.transient = markers;
        self
    }

    /// Replace the non-transient marker set.
    pub fn with_non_transient_markers(mut self, markers: MarkerSet) -> Self {
        self.non_transient = markers;
        self
    }

    pub fn extend_transient<I, S>(&mut self, markers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.transient.extend(markers);
    }

    pub fn extend_non_transient<I, S>(&mut self, markers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.non_transient.extend(markers);
    }

    pub fn transient_markers(&self) -> &MarkerSet {
        &self.transient
    }

    pub fn non_transient_markers(&self) -> &MarkerSet {
        &self.non_transient
    }

    /// Classify an operation error. Errors that are not gateway errors are never transient.
    pub fn is_transient<E: GatewayFailure + ?Sized>(&self, err: &E) -> bool {
        match err.as_gateway_error() {
            Some(gw) => self.is_transient_message(gw.message()),
            None => false,
        }
    }

    /// Classify a raw gateway error message.
    pub fn is_transient_message(&self, message: &str) -> bool {
        if message.is_empty() {
            return false;
        }
        let message = message.to_lowercase();
        if self.non_transient.matches(&message) {
            return false;
        }
        // Gateway answering 503 during the websocket upgrade is restarting.
        (message.contains("503") && message.contains("websocket")) || self.transient.matches(&message)
    }
}
