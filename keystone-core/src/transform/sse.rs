/// One `data:`-bearing SSE event as surfaced to expressions by `sseEvents`.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

/// Parse a raw SSE byte stream into discrete events (`spec.md` §4.5 text/SSE
/// builtins). Events are separated by a blank line; multiple `data:` lines
/// within one event are joined with `\n` per the SSE spec. Lines beginning
/// with `:` are comments and ignored. A trailing event without a terminating
/// blank line is still captured.
pub fn parse_events(text: &str) -> Vec<SseEvent> {
    let mut events = Vec::new();
    let mut event_name: Option<String> = None;
    let mut id: Option<String> = None;
    let mut data_lines: Vec<String> = Vec::new();

    let flush = |event_name: &mut Option<String>, id: &mut Option<String>, data_lines: &mut Vec<String>, events: &mut Vec<SseEvent>| {
        if !data_lines.is_empty() || event_name.is_some() {
            events.push(SseEvent { event: event_name.take(), id: id.clone(), data: data_lines.join("\n") });
        }
        data_lines.clear();
    };

    for raw_line in text.lines() {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() {
            flush(&mut event_name, &mut id, &mut data_lines, &mut events);
            continue;
        }
        if let Some(rest) = line.strip_prefix(':') {
            let _ = rest;
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        } else if let Some(rest) = line.strip_prefix("event:") {
            event_name = Some(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        } else if let Some(rest) = line.strip_prefix("id:") {
            id = Some(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
    }
    flush(&mut event_name, &mut id, &mut data_lines, &mut events);

    events
}

pub fn last_data(text: &str) -> Option<String> {
    parse_events(text).into_iter().rev().map(|e| e.data).find(|d| !d.is_empty())
}

pub fn all_data(text: &str) -> Vec<String> {
    parse_events(text).into_iter().map(|e| e.data).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "event: message\ndata: {\"usage\":{\"tokens\":1}}\n\nevent: message\ndata: {\"usage\":{\"tokens\":5}}\n\ndata: [DONE]\n\n";

    #[test]
    fn parses_three_events() {
        let events = parse_events(STREAM);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event.as_deref(), Some("message"));
        assert_eq!(events[2].data, "[DONE]");
    }

    #[test]
    fn last_data_skips_trailing_blank_events() {
        assert_eq!(last_data(STREAM).unwrap(), "[DONE]");
    }

    #[test]
    fn all_data_returns_every_payload_in_order() {
        let all = all_data(STREAM);
        assert_eq!(all, vec!["{\"usage\":{\"tokens\":1}}", "{\"usage\":{\"tokens\":5}}", "[DONE]"]);
    }

    #[test]
    fn multiline_data_within_one_event_is_newline_joined() {
        let events = parse_events("data: line1\ndata: line2\n\n");
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn comment_lines_are_ignored() {
        let events = parse_events(": keep-alive\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }
}
