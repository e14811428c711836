//! Human-readable metrics summary for `GET /`.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

/// Render all metrics as an HTML page: a gauge table followed by a
/// counter table, rows sorted by metric name.
pub fn render_report(gauges: &HashMap<String, f64>, counters: &HashMap<String, i64>) -> String {
    let gauges: BTreeMap<_, _> = gauges.iter().collect();
    let counters: BTreeMap<_, _> = counters.iter().collect();

    let mut page = String::from("<html>\n<body>\n<h1>Gauge metrics</h1>\n<table>\n");
    for (name, value) in gauges {
        let _ = writeln!(page, "<tr><td>{name}</td><td>{value}</td></tr>");
    }
    page.push_str("</table>\n<h1>Counter metrics</h1>\n<table>\n");
    for (name, delta) in counters {
        let _ = writeln!(page, "<tr><td>{name}</td><td>{delta}</td></tr>");
    }
    page.push_str("</table>\n</body>\n</html>\n");
    page
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
