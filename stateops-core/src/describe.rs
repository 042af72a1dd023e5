//! Human-readable descriptions of removals.

use crate::addrs::Address;
use crate::filter::FilterResult;

pub const NOTHING_REMOVED: &str = "Would have removed nothing.";

/// Describe what removing `matches` would do, without doing it.
pub fn describe(matches: &[FilterResult<'_>]) -> String {
    let mut out = String::new();
    for m in matches {
        match m {
            FilterResult::Module(addr, module) => {
                let mut contents = String::new();
                for (resource, record) in module.resources() {
                    let abs = addr.resource(resource.clone());
                    for key in record.instances().map(|(k, _)| k) {
                        contents.push_str(&format!("  * {}\n", abs.instance(key.clone())));
                    }
                }
                if contents.is_empty() {
                    out.push_str(&format!("Would remove module {:?}\n", addr.to_string()));
                } else {
                    out.push_str(&format!(
                        "Would remove module {:?} containing:\n{}",
                        addr.to_string(),
                        contents
                    ));
                }
            }
            FilterResult::Resource(addr, _) => {
                out.push_str(&format!("Would remove resource {}\n", addr));
            }
            FilterResult::Instance(addr, _) => {
                out.push_str(&format!("Would remove resource instance {}\n", addr));
            }
        }
    }

    let out = out.trim_end_matches('\n');
    if out.is_empty() {
        NOTHING_REMOVED.to_string()
    } else {
        out.to_string()
    }
}

/// The line announcing an actual removal.
pub fn removal_line(addr: &Address) -> String {
    match addr {
        Address::Module(a) => format!("Remove module {}", a),
        Address::Resource(a) => format!("Remove resource {}", a),
        Address::Instance(a) => format!("Remove resource instance {}", a),
    }
}
