//! HTTP response validation for downloads

use macfetch_errors::{Error, NetworkError};
use reqwest::header::{ACCEPT_RANGES, CONTENT_RANGE};
use reqwest::{Response, StatusCode};

use crate::client::status_error;

/// How the server answered a (possibly ranged) GET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RangeOutcome {
    /// Body starts at the requested offset; carries the total size if known
    Resumed { total: Option<u64> },
    /// Body is the whole payload
    Full { total: Option<u64> },
    /// 416: the requested offset is not satisfiable
    Unsatisfiable,
}

/// Classify a response to a GET that asked for `bytes=<offset>-` (or no range when 0)
pub(super) fn validate_response(response: &Response, offset: u64, url: &str) -> Result<RangeOutcome, Error> {
    let status = response.status();

    if offset > 0 && status == StatusCode::RANGE_NOT_SATISFIABLE {
        return Ok(RangeOutcome::Unsatisfiable);
    }

    if !status.is_success() {
        return Err(status_error(status).into());
    }

    if status == StatusCode::PARTIAL_CONTENT {
        let header = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| NetworkError::InvalidResponse {
                url: url.to_string(),
                reason: "206 without Content-Range".to_string(),
            })?;
        let (start, total) = parse_content_range(header).ok_or_else(|| {
            NetworkError::InvalidResponse {
                url: url.to_string(),
                reason: format!("malformed Content-Range {header:?}"),
            }
        })?;
        if start != offset {
            // Body error class so the attempt is retried
            return Err(NetworkError::DownloadFailed(format!(
                "{url}: Content-Range starts at {start}, requested {offset}"
            ))
            .into());
        }
        if offset == 0 {
            return Ok(RangeOutcome::Full { total });
        }
        return Ok(RangeOutcome::Resumed { total });
    }

    Ok(RangeOutcome::Full {
        total: response.content_length(),
    })
}

/// Parse `bytes <start>-<end>/<total|*>` into the start offset and total
pub(super) fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end: u64 = end.trim().parse().ok()?;
    if end < start {
        return None;
    }
    let total = match total.trim() {
        "*" => None,
        n => Some(n.parse().ok()?),
    };
    Some((start, total))
}

/// Whether a HEAD response advertises byte-range support
pub(super) fn accepts_ranges(response: &Response) -> bool {
    response
        .headers()
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|unit| unit.trim().eq_ignore_ascii_case("bytes")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_forms() {
        assert_eq!(parse_content_range("bytes 100-199/200"), Some((100, Some(200))));
        assert_eq!(parse_content_range("bytes 0-0/*"), Some((0, None)));
        assert_eq!(parse_content_range("bytes 5-4/10"), None);
        assert_eq!(parse_content_range("items 0-1/2"), None);
        assert_eq!(parse_content_range("bytes */200"), None);
    }
}
