//! Stock level XML feed reader.
//!
//! The document is a sequence of item elements, each with a code child and a
//! quantity child (`<item><LITM>1289</LITM><STQU>4</STQU></item>` for
//! Alltron). Everything else is ignored.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::warn;

use supplysync_catalog::{NumberLocale, StockFeedLayout};

use crate::sync::FeedError;

/// One `(code, quantity)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    pub code: String,
    pub quantity: i64,
}

impl StockLevel {
    pub fn new(code: impl Into<String>, quantity: i64) -> Self {
        Self {
            code: code.into(),
            quantity,
        }
    }
}

/// Parsed stock feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockFeed {
    pub levels: Vec<StockLevel>,
    /// Items without a code or with an unparseable quantity.
    pub rejected: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Capture {
    Code,
    Quantity,
}

/// Read the whole document. Malformed XML fails the feed before any pair is
/// applied.
pub fn read_stock_levels<R: BufRead>(
    source: R,
    layout: &StockFeedLayout,
    locale: &NumberLocale,
) -> Result<StockFeed, FeedError> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let item = layout.item_element.as_bytes();
    let code_element = layout.code_element.as_bytes();
    let quantity_element = layout.quantity_element.as_bytes();

    let mut feed = StockFeed::default();
    let mut buf = Vec::new();
    let mut in_item = false;
    let mut capture = None;
    let mut code = String::new();
    let mut quantity = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == item {
                    in_item = true;
                    code.clear();
                    quantity.clear();
                } else if in_item && name.as_ref() == code_element {
                    capture = Some(Capture::Code);
                } else if in_item && name.as_ref() == quantity_element {
                    capture = Some(Capture::Quantity);
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(target) = capture {
                    let text = t
                        .unescape()
                        .map_err(|e| FeedError::Malformed(format!("bad text content: {e}")))?;
                    match target {
                        Capture::Code => code.push_str(&text),
                        Capture::Quantity => quantity.push_str(&text),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                let text = String::from_utf8_lossy(&c);
                match capture {
                    Some(Capture::Code) => code.push_str(&text),
                    Some(Capture::Quantity) => quantity.push_str(&text),
                    None => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == item && in_item {
                    in_item = false;
                    capture = None;
                    push_level(&mut feed, code.trim(), &quantity, locale);
                } else if name.as_ref() == code_element || name.as_ref() == quantity_element {
                    capture = None;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(FeedError::Malformed(format!(
                    "XML parse error at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
        buf.clear();
    }

    Ok(feed)
}

fn push_level(feed: &mut StockFeed, code: &str, quantity: &str, locale: &NumberLocale) {
    if code.is_empty() {
        feed.rejected += 1;
        return;
    }
    match locale.parse_integer(quantity) {
        Ok(Some(quantity)) => feed.levels.push(StockLevel::new(code, quantity)),
        Ok(None) | Err(_) => {
            warn!(code, raw = %quantity, "stock feed quantity rejected");
            feed.rejected += 1;
        }
    }
}
