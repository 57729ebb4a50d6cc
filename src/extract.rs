use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, ParseError, Result};
use crate::processor::ProcessorRecord;

/// Regex locators for every field we scrape, kept apart from the parsing
/// logic so a markup change on the site only needs a new config.
///
/// Every field pattern captures its value in a group named `value`, except
/// `cores` which captures `cores` and `threads`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub page: PageSelectors,
    pub listing: ListingSelectors,
}

/// Locators for a single cpu detail page (`cpu.php?id=N`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSelectors {
    pub name: String,
    pub multi_thread: String,
    pub single_thread: String,
    pub first_seen: String,
    pub tdp: String,
    pub cores: String,
    pub samples: String,
}

/// Locators for a chart listing page, one row per cpu.
///
/// `row` matches a whole entry, the other patterns run against that match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSelectors {
    pub row: String,
    pub id: String,
    pub name: String,
    pub score: String,
    pub price: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            page: PageSelectors {
                name: r#"<span class="cpuname">(?P<value>[^<]*)</span>"#.into(),
                multi_thread: r#"<span style="[^"]*font-size: 44px;[^"]*">(?P<value>[\d,]+)</span>"#
                    .into(),
                single_thread: r"<strong> *Single Thread Rating: *</strong> *(?P<value>[\d,]+) *<br */?>"
                    .into(),
                first_seen: r#"<strong class="bg-table-row">CPU First Seen on Charts:</strong>(?:&nbsp;| )*(?P<value>[^<]*)</p>"#
                    .into(),
                tdp: r"<strong>Typical TDP:</strong> *(?P<value>\d+) *W(?:<sup>\d+</sup>)?</p>".into(),
                cores: r"<strong>Cores:?</strong>:? *(?P<cores>\d+) *<strong>Threads:?</strong>:? *(?P<threads>\d+) *</p>"
                    .into(),
                samples: r"<strong> *Samples: *</strong> *(?P<value>[\d,]+)\s*\*?\s*<br */?>".into(),
            },
            listing: ListingSelectors {
                row: r#"(?s)<li id="rk\d+"[^>]*>.*?</li>"#.into(),
                id: r#"<li id="rk(?P<value>\d+)""#.into(),
                name: r#"<span class="prdname">(?P<value>[^<]*)</span>"#.into(),
                score: r#"<span class="count">(?P<value>[^<]*)</span>"#.into(),
                price: r#"<span class="price-neww">(?P<value>[^<]*)</span>"#.into(),
            },
        }
    }
}

impl SelectorConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone)]
struct Field {
    name: &'static str,
    regex: Regex,
}

impl Field {
    fn compile(name: &'static str, pattern: &str, groups: &[&'static str]) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| Error::SelectorError {
            field: name,
            source,
        })?;
        if let Some(&group) = groups
            .iter()
            .find(|g| !regex.capture_names().flatten().any(|n| n == **g))
        {
            return Err(Error::SelectorMissingGroup { field: name, group });
        }
        Ok(Self { name, regex })
    }

    fn value<'h>(&self, haystack: &'h str) -> Option<&'h str> {
        self.regex
            .captures(haystack)?
            .name("value")
            .map(|m| m.as_str())
    }
}

/// A processor entry that was skipped, with its 1-based position in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryError {
    pub position: usize,
    pub error: ParseError,
}

/// Everything a listing page yielded: the good records in document order and
/// the entries that had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: Vec<ProcessorRecord>,
    pub errors: Vec<EntryError>,
}

/// A compiled [`SelectorConfig`]
#[derive(Debug, Clone)]
pub struct Extractor {
    name: Field,
    multi_thread: Field,
    single_thread: Field,
    first_seen: Field,
    tdp: Field,
    cores: Field,
    samples: Field,
    row: Regex,
    row_id: Field,
    row_name: Field,
    row_score: Field,
    row_price: Field,
}

static DEFAULT_EXTRACTOR: Lazy<Extractor> = Lazy::new(|| {
    Extractor::new(&SelectorConfig::default()).expect("built-in selectors are valid")
});

/// The built-in cpubenchmark.net selectors, compiled once per process
impl Default for Extractor {
    fn default() -> Self {
        DEFAULT_EXTRACTOR.clone()
    }
}

impl Extractor {
    pub fn new(config: &SelectorConfig) -> Result<Self> {
        let page = &config.page;
        let listing = &config.listing;
        let value = &["value"];
        Ok(Self {
            name: Field::compile("name", &page.name, value)?,
            multi_thread: Field::compile("multi thread", &page.multi_thread, value)?,
            single_thread: Field::compile("single thread", &page.single_thread, value)?,
            first_seen: Field::compile("first seen", &page.first_seen, value)?,
            tdp: Field::compile("tdp", &page.tdp, value)?,
            cores: Field::compile("cores", &page.cores, &["cores", "threads"])?,
            samples: Field::compile("samples", &page.samples, value)?,
            row: Field::compile("row", &listing.row, &[])?.regex,
            row_id: Field::compile("id", &listing.id, value)?,
            row_name: Field::compile("name", &listing.name, value)?,
            row_score: Field::compile("score", &listing.score, value)?,
            row_price: Field::compile("price", &listing.price, value)?,
        })
    }

    /// Parses a cpu detail page into a single record.
    ///
    /// The name and multi thread score are required, everything else is left
    /// as `None` when the page doesn't have it.
    pub fn extract_cpu_page(&self, html: &str) -> EntryResult<ProcessorRecord> {
        let name = self
            .name
            .value(html)
            .ok_or(ParseError::MissingField {
                field: self.name.name,
            })
            .and_then(clean_name)?;
        let score = required_number(&self.multi_thread, html)?;

        let mut record = ProcessorRecord::new(name, score);
        record.single_thread = optional_number(&self.single_thread, html);
        record.tdp = optional_number(&self.tdp, html);
        record.samples = optional_number(&self.samples, html);
        record.first_seen = self
            .first_seen
            .value(html)
            .map(|s| decode_html_escapes(s).trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(caps) = self.cores.regex.captures(html) {
            record.cores = caps.name("cores").and_then(|m| m.as_str().parse().ok());
            record.threads = caps.name("threads").and_then(|m| m.as_str().parse().ok());
        } else {
            debug!("no cores/threads on page");
        }
        Ok(record)
    }

    /// Parses every row of a chart listing page, skipping the rows that are
    /// missing a name or score instead of failing the whole page.
    pub fn extract_listing(&self, html: &str) -> Extraction {
        let mut extraction = Extraction::default();
        for (i, row) in self.row.find_iter(html).enumerate() {
            let position = i + 1;
            match self.extract_row(row.as_str()) {
                Ok(mut record) => {
                    record.rank = Some(position as u32);
                    extraction.records.push(record);
                }
                Err(error) => {
                    warn!(position, %error, "skipping listing entry");
                    extraction.errors.push(EntryError { position, error });
                }
            }
        }
        debug!(
            parsed = extraction.records.len(),
            skipped = extraction.errors.len(),
            "finished parsing listing"
        );
        extraction
    }

    fn extract_row(&self, row: &str) -> EntryResult<ProcessorRecord> {
        let name = self
            .row_name
            .value(row)
            .ok_or(ParseError::MissingField {
                field: self.row_name.name,
            })
            .and_then(clean_name)?;
        let score = required_number(&self.row_score, row)?;
        let mut record = ProcessorRecord::new(name, score);
        record.id = self.row_id.value(row).map(str::to_string);
        record.price = match self.row_price.value(row).map(parse_price) {
            Some(Ok(price)) => price,
            Some(Err(value)) => {
                debug!(%value, "unparseable price");
                None
            }
            None => None,
        };
        Ok(record)
    }
}

pub type EntryResult<T> = std::result::Result<T, ParseError>;

/// Decodes and normalizes a processor name. The site appends the base clock
/// (`@ 1.60GHz`) to some names but not others, so it's dropped everywhere.
fn clean_name(raw: &str) -> EntryResult<String> {
    let name = decode_html_escapes(raw);
    let name = name.split('@').next().unwrap_or_default();
    let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        Err(ParseError::EmptyName)
    } else {
        Ok(name)
    }
}

fn required_number(field: &Field, haystack: &str) -> EntryResult<u32> {
    let raw = field.value(haystack).ok_or(ParseError::MissingField {
        field: field.name,
    })?;
    parse_number_with_commas(raw)
        .map_err(|value| ParseError::InvalidNumber {
            field: field.name,
            value,
        })?
        .ok_or(ParseError::MissingField { field: field.name })
}

fn optional_number(field: &Field, haystack: &str) -> Option<u32> {
    match field.value(haystack).map(parse_number_with_commas) {
        Some(Ok(n)) => n,
        Some(Err(value)) => {
            warn!(field = field.name, %value, "ignoring non-numeric value");
            None
        }
        None => {
            debug!(field = field.name, "field not on page");
            None
        }
    }
}

fn decode_html_escapes(input: &str) -> Cow<'_, str> {
    html_escape::decode_html_entities(input)
}

/// Parses "12,345" style numbers. "", "-" and "NA" are the site's way of
/// saying there is no value. Returns the offending text on failure.
pub(crate) fn parse_number_with_commas(input: &str) -> std::result::Result<Option<u32>, String> {
    let decoded = decode_html_escapes(input);
    let trimmed = decoded.trim();
    match trimmed {
        "" | "-" | "NA" => return Ok(None),
        _ => {}
    }
    let mut n: u32 = 0;
    let mut digits = 0;
    for c in trimmed.chars() {
        match c {
            '0'..='9' => {
                n = n
                    .checked_mul(10)
                    .and_then(|n| n.checked_add(c as u32 - '0' as u32))
                    .ok_or_else(|| trimmed.to_string())?;
                digits += 1;
            }
            ',' | '\'' | '_' => {}
            c if c.is_whitespace() => {}
            _ => return Err(trimmed.to_string()),
        }
    }
    if digits == 0 {
        return Err(trimmed.to_string());
    }
    Ok(Some(n))
}

/// Parses "$1,299.99" style prices, `*` marks are dropped
pub(crate) fn parse_price(input: &str) -> std::result::Result<Option<f64>, String> {
    let decoded = decode_html_escapes(input);
    let trimmed = decoded.trim();
    match trimmed {
        "" | "-" | "NA" => return Ok(None),
        _ => {}
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '*') && !c.is_whitespace())
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p >= 0.0)
        .map(Some)
        .ok_or_else(|| trimmed.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn listing_row(id: u32, name: &str, score: &str, price: &str) -> String {
        format!(
            r#"<li id="rk{id}"><span class="more_details" onclick="x(event, 1, 2, 1, 0, 0);"><a class="name" style="display: none;"></a><div class="more_details_text"></div></span><a href="cpu.php?cpu=x&amp;id={id}"><span class="prdname">{name}</span><div><span class="index pink" style="width: 17%">(17%)</span></div><span class="count">{score}</span><span class="price-neww">{price}</span></a></li>"#
        )
    }

    pub(crate) fn listing_page(rows: &[String]) -> String {
        format!(
            r#"<html><body><div class="chart"><ul class="chartlist">{}</ul></div></body></html>"#,
            rows.join("\n")
        )
    }

    pub(crate) fn cpu_page(name: &str, score: &str) -> String {
        format!(
            r#"<html><body>
<div class="desc-header"><span class="cpuname">{name}</span></div>
<div class="right-desc"><span style="font-family: Arial, Helvetica, sans-serif;font-size: 44px;	font-weight: bold; color: #F48A18;">{score}</span></div>
<div class="left-desc-cpu">
<p><strong>Cores:</strong> 4 <strong>Threads:</strong> 8</p>
<p><strong>Typical TDP:</strong> 15 W<sup>2</sup></p>
</div>
<p><strong class="bg-table-row">CPU First Seen on Charts:</strong>&nbsp;&nbsp;Q2 2019</p>
<strong>Single Thread Rating:</strong> 2,213<br>
<strong>Samples:</strong> 1,458*<br>
</body></html>"#
        )
    }

    #[test]
    fn well_formed_listing() {
        let rows = [
            listing_row(3447, "Intel Core i5-8365U @ 1.60GHz", "6,213", "$297.00"),
            listing_row(3725, "AMD Ryzen 5 4600U", "14,220", "NA"),
            listing_row(4141, "AMD Ryzen 5 5500U", "12,867", "$1,299.99*"),
        ];
        let extraction = Extractor::default().extract_listing(&listing_page(&rows));

        assert!(extraction.errors.is_empty());
        let got: Vec<_> = extraction
            .records
            .iter()
            .map(|r| (r.id.as_deref(), r.name.as_str(), r.score, r.price, r.rank))
            .collect();
        assert_eq!(
            got,
            [
                (Some("3447"), "Intel Core i5-8365U", 6_213, Some(297.0), Some(1)),
                (Some("3725"), "AMD Ryzen 5 4600U", 14_220, None, Some(2)),
                (Some("4141"), "AMD Ryzen 5 5500U", 12_867, Some(1_299.99), Some(3)),
            ]
        );
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let rows = [
            listing_row(1, "Good One", "1,000", "$10"),
            listing_row(2, "No Score", "NA", "$10"),
            listing_row(3, "  ", "2,000", "$10"),
            listing_row(4, "Garbage Score", "fast", "$10"),
            listing_row(5, "Good Two", "3,000", "$10"),
        ];
        let extraction = Extractor::default().extract_listing(&listing_page(&rows));

        let names: Vec<_> = extraction.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Good One", "Good Two"]);
        assert_eq!(
            extraction.errors,
            [
                EntryError {
                    position: 2,
                    error: ParseError::MissingField { field: "score" }
                },
                EntryError {
                    position: 3,
                    error: ParseError::EmptyName
                },
                EntryError {
                    position: 4,
                    error: ParseError::InvalidNumber {
                        field: "score",
                        value: "fast".into()
                    }
                },
            ]
        );
    }

    #[test]
    fn empty_listing() {
        let extraction = Extractor::default().extract_listing("<html></html>");
        assert!(extraction.records.is_empty());
        assert!(extraction.errors.is_empty());
    }

    #[test]
    fn names_are_unescaped() {
        let rows = [listing_row(9, "Intel Pentium&reg; 4   2.80GHz", "300", "")];
        let extraction = Extractor::default().extract_listing(&listing_page(&rows));
        assert_eq!(extraction.records[0].name, "Intel Pentium® 4 2.80GHz");
    }

    #[test]
    fn detail_page() {
        let page = cpu_page("Intel Core i5-8365U @ 1.60GHz", "6213");
        let record = Extractor::default().extract_cpu_page(&page).unwrap();
        assert_eq!(record.name, "Intel Core i5-8365U");
        assert_eq!(record.score, 6_213);
        assert_eq!(record.single_thread, Some(2_213));
        assert_eq!(record.tdp, Some(15));
        assert_eq!(record.cores, Some(4));
        assert_eq!(record.threads, Some(8));
        assert_eq!(record.samples, Some(1_458));
        assert_eq!(record.first_seen.as_deref(), Some("Q2 2019"));
    }

    #[test]
    fn clock_suffix_is_dropped_in_both_layouts() {
        let extractor = Extractor::default();
        let name = "Intel Core i5-8365U @ 1.60GHz";
        let from_page = extractor.extract_cpu_page(&cpu_page(name, "6,213")).unwrap();
        let listing = listing_page(&[listing_row(3447, name, "6,213", "NA")]);
        let from_listing = extractor.extract_listing(&listing);
        assert_eq!(from_page.name, "Intel Core i5-8365U");
        assert_eq!(from_listing.records[0].name, from_page.name);

        let only_clock = listing_page(&[listing_row(1, "@ 2.00GHz", "1", "NA")]);
        let extraction = extractor.extract_listing(&only_clock);
        assert!(extraction.records.is_empty());
        assert_eq!(extraction.errors[0].error, ParseError::EmptyName);
    }

    #[test]
    fn default_extractor_uses_built_in_selectors() {
        let config = SelectorConfig::default();
        assert_eq!(Extractor::default().row.as_str(), config.listing.row);
        assert_eq!(
            Extractor::default().name.regex.as_str(),
            Extractor::new(&config).unwrap().name.regex.as_str()
        );
    }

    #[test]
    fn detail_page_missing_optional_fields() {
        let page = r#"<span class="cpuname">AMD Ryzen 5 4600H</span>
<span style="font-size: 44px; color: #F48A18;">14,450</span>"#;
        let record = Extractor::default().extract_cpu_page(page).unwrap();
        assert_eq!(record.name, "AMD Ryzen 5 4600H");
        assert_eq!(record.score, 14_450);
        assert_eq!(record.single_thread, None);
        assert_eq!(record.cores, None);
        assert_eq!(record.first_seen, None);
    }

    #[test]
    fn detail_page_missing_required_fields() {
        let extractor = Extractor::default();
        assert_eq!(
            extractor.extract_cpu_page("<html>Access denied</html>"),
            Err(ParseError::MissingField { field: "name" })
        );
        assert_eq!(
            extractor.extract_cpu_page(r#"<span class="cpuname">Some CPU</span>"#),
            Err(ParseError::MissingField {
                field: "multi thread"
            })
        );
    }

    #[test]
    fn custom_selectors() {
        let mut config = SelectorConfig::default();
        config.listing.row = r#"(?s)<tr class="cpu">.*?</tr>"#.into();
        config.listing.name = r"<td>(?P<value>[^<]+)</td>".into();
        config.listing.score = r#"<td class="mark">(?P<value>[^<]+)</td>"#.into();
        let extractor = Extractor::new(&config).unwrap();
        let html = r#"<table><tr class="cpu"><td>Chip A</td><td class="mark">5,000</td></tr>
<tr class="cpu"><td>Chip B</td><td class="mark">7,500</td></tr></table>"#;
        let extraction = extractor.extract_listing(html);
        let got: Vec<_> = extraction
            .records
            .iter()
            .map(|r| (r.name.as_str(), r.score, r.id.as_deref()))
            .collect();
        assert_eq!(got, [("Chip A", 5_000, None), ("Chip B", 7_500, None)]);
    }

    #[test]
    fn selector_config_from_json() {
        let json = serde_json::to_string(&SelectorConfig::default()).unwrap();
        assert_eq!(
            SelectorConfig::from_json(&json).unwrap(),
            SelectorConfig::default()
        );
    }

    #[test]
    fn invalid_selectors_are_rejected() {
        let mut config = SelectorConfig::default();
        config.page.tdp = "(unclosed".into();
        assert!(matches!(
            Extractor::new(&config),
            Err(Error::SelectorError { field: "tdp", .. })
        ));

        let mut config = SelectorConfig::default();
        config.listing.score = r#"<span class="count">([^<]*)</span>"#.into();
        assert!(matches!(
            Extractor::new(&config),
            Err(Error::SelectorMissingGroup {
                field: "score",
                group: "value"
            })
        ));
    }

    #[test]
    fn parse_numbers() {
        let numbers = ["994,480", "82,010", "1,000,000", "-", "", "NA", "3 400", "0"];
        let expected = [
            Ok(Some(994_480)),
            Ok(Some(82_010)),
            Ok(Some(1_000_000)),
            Ok(None),
            Ok(None),
            Ok(None),
            Ok(Some(3_400)),
            Ok(Some(0)),
        ];
        let output = numbers
            .iter()
            .map(|n| parse_number_with_commas(n))
            .collect::<Vec<_>>();
        assert_eq!(&expected[..], &output[..]);
    }

    #[test]
    fn parse_bad_numbers() {
        assert_eq!(parse_number_with_commas("12a"), Err("12a".to_string()));
        assert_eq!(parse_number_with_commas(","), Err(",".to_string()));
        assert_eq!(
            parse_number_with_commas("99,999,999,999"),
            Err("99,999,999,999".to_string())
        );
    }

    #[test]
    fn parse_prices() {
        assert_eq!(parse_price("$297.00"), Ok(Some(297.0)));
        assert_eq!(parse_price("$1,299.99*"), Ok(Some(1_299.99)));
        assert_eq!(parse_price("NA"), Ok(None));
        assert_eq!(parse_price("call us"), Err("call us".to_string()));
    }
}
