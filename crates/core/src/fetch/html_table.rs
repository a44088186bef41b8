use crate::fetch::{FetchError, FetchResult};
use regex::Regex;
use std::sync::LazyLock;

static TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<table\b.*?</table>").expect("valid table regex"));
static ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("valid row regex"));
static CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").expect("valid cell regex"));
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));

/// Text of the cells in the first `<td>` row of the first table on the page.
/// Header rows (`<th>` only) are skipped.
pub fn first_data_row(html: &str) -> FetchResult<Vec<String>> {
    let table = TABLE_RE
        .find(html)
        .ok_or(FetchError::Empty("page has no table"))?;

    for row in ROW_RE.captures_iter(table.as_str()) {
        let cells: Vec<String> = CELL_RE
            .captures_iter(&row[1])
            .map(|c| cell_text(&c[1]))
            .collect();
        if !cells.is_empty() {
            return Ok(cells);
        }
    }

    Err(FetchError::Empty("table has no data rows"))
}

/// Second cell of the first data row, as a number.
pub fn first_row_value(html: &str) -> FetchResult<f64> {
    let cells = first_data_row(html)?;
    let raw = cells
        .get(1)
        .ok_or(FetchError::Empty("first data row has fewer than two cells"))?;
    parse_number(raw)
}

fn cell_text(inner: &str) -> String {
    let stripped = TAG_RE.replace_all(inner, "");
    stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

fn parse_number(raw: &str) -> FetchResult<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '%') && !c.is_whitespace())
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FetchError::Parse(format!("table cell is not numeric: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <table class="quote">
          <tr><th>Time</th><th>Yield</th><th>Chg</th></tr>
          <tr><td>2026/10/16</td><td> <span>0.98</span> </td><td>+0.01</td></tr>
          <tr><td>2026/10/15</td><td>0.97</td><td>-0.02</td></tr>
        </table>
        <table><tr><td>x</td><td>99</td></tr></table>
        </body></html>
    "#;

    #[test]
    fn reads_second_cell_of_first_data_row() {
        assert_eq!(first_row_value(PAGE).unwrap(), 0.98);
    }

    #[test]
    fn strips_markup_from_cells() {
        let cells = first_data_row(PAGE).unwrap();
        assert_eq!(cells, vec!["2026/10/16", "0.98", "+0.01"]);
    }

    #[test]
    fn page_without_table_is_empty() {
        assert!(matches!(first_row_value("<p>moved</p>"), Err(FetchError::Empty(_))));
    }

    #[test]
    fn non_numeric_cell_is_a_parse_error() {
        let html = "<table><tr><td>a</td><td>--</td></tr></table>";
        assert!(matches!(first_row_value(html), Err(FetchError::Parse(_))));
    }

    #[test]
    fn non_finite_cells_are_parse_errors() {
        for cell in ["NaN", "inf", "-Infinity"] {
            let html = format!("<table><tr><td>a</td><td>{cell}</td></tr></table>");
            assert!(
                matches!(first_row_value(&html), Err(FetchError::Parse(_))),
                "{cell} should be rejected"
            );
        }
    }
}
