//! Reading symbol matches out of engine search output.
//!
//! A structured entry (one JSON object per line, or a JSON array of them)
//! is the canonical source of a symbol's identifier. Rendered text is only
//! scanned when the output carries no structured entries at all.

use serde::Deserialize;

/// Length of a symbol hash as rendered by the engine.
pub const HASH_LEN: usize = 16;

#[derive(Debug, Deserialize)]
struct SymbolEntry {
    #[serde(alias = "s", alias = "name")]
    symbol: String,
    #[serde(default, alias = "h", alias = "symbol_hash")]
    hash: Option<String>,
}

/// A search response that matched the requested symbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolHit {
    /// Stable identifier usable against the call graph, when one was found.
    pub identifier: Option<String>,
    pub structured: bool,
}

/// Find `symbol` in search output.
pub fn find_symbol(output: &str, symbol: &str) -> Option<SymbolHit> {
    if let Some(entries) = structured_entries(output) {
        return entries
            .into_iter()
            .find(|e| e.symbol == symbol)
            .map(|e| SymbolHit {
                identifier: e.hash.filter(|h| !h.is_empty()),
                structured: true,
            });
    }
    if !output.contains(symbol) {
        return None;
    }
    let identifier = output
        .lines()
        .filter(|line| line.contains(symbol))
        .find_map(|line| line.split_whitespace().find(|tok| is_hash_token(tok)))
        .map(str::to_string);
    Some(SymbolHit {
        identifier,
        structured: false,
    })
}

/// Structured entries in `output`, or `None` when it has none.
fn structured_entries(output: &str) -> Option<Vec<SymbolEntry>> {
    let trimmed = output.trim_start();
    let entries: Vec<SymbolEntry> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).ok()?
    } else {
        output
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with('{'))
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    };
    (!entries.is_empty()).then_some(entries)
}

/// Exactly [`HASH_LEN`] lowercase hex digits.
pub fn is_hash_token(tok: &str) -> bool {
    tok.len() == HASH_LEN && tok.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Whether `identifier` appears anywhere in call-graph output.
///
/// Plain substring presence; an unrelated edge carrying the same string also
/// counts.
pub fn call_graph_mentions(output: &str, identifier: &str) -> bool {
    !identifier.is_empty() && output.contains(identifier)
}
