//! Leaderboard row extraction from listing-page HTML.
//!
//! The selectors are a fixed contract with tracker.gg's markup: each ranked
//! row holds a profile anchor (name + discriminator) and, somewhere in the
//! same table row, an optional "Visit twitch profile" link.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use neuraltheft_shared::CollectedRecord;

static ROW_ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("td a[href*='/valorant/profile']"));
static DISPLAY_NAME: LazyLock<Selector> =
    LazyLock::new(|| selector("span.v3-trnign .max-w-full.truncate"));
static DISCRIMINATOR: LazyLock<Selector> =
    LazyLock::new(|| selector("span.v3-trnign__discriminator"));
static HANDLE_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a[aria-label="Visit twitch profile"]"#));

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e}"))
}

/// What a single listing page contained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageScan {
    /// Rows that matched the profile-anchor selector.
    pub candidates: usize,
    /// Rows with every required field, in page order.
    pub records: Vec<CollectedRecord>,
}

impl PageScan {
    /// Rows dropped for a missing display name or handle.
    pub fn dropped(&self) -> usize {
        self.candidates - self.records.len()
    }

    /// A page without any candidate row lies past the last leaderboard page.
    pub fn is_past_end(&self) -> bool {
        self.candidates == 0
    }
}

/// Scan a listing page for leaderboard rows.
pub fn scan_page(html: &str) -> PageScan {
    let doc = Html::parse_document(html);
    let mut scan = PageScan::default();

    for anchor in doc.select(&ROW_ANCHOR) {
        scan.candidates += 1;
        if let Some(record) = extract_row(anchor) {
            scan.records.push(record);
        }
    }

    scan
}

/// Pull one record out of a profile anchor, or `None` if a required field is missing.
fn extract_row(anchor: ElementRef<'_>) -> Option<CollectedRecord> {
    let raw_name = child_text(anchor, &DISPLAY_NAME);
    let display_name = raw_name.trim();
    let display_name = display_name.strip_suffix('#').unwrap_or(display_name).trim_end();

    let raw_tag = child_text(anchor, &DISCRIMINATOR);
    let tag = raw_tag.trim();
    let tag = tag.strip_prefix('#').unwrap_or(tag);

    // td -> tr: the handle link sits in a sibling cell of the same row.
    let row = anchor
        .parent()
        .and_then(|cell| cell.parent())
        .and_then(ElementRef::wrap)?;
    let href = row
        .select(&HANDLE_LINK)
        .find_map(|link| link.value().attr("href"))?;
    let external_handle = handle_from_href(href)?;

    if display_name.is_empty() {
        tracing::trace!(href, "row without display name");
        return None;
    }

    Some(CollectedRecord {
        display_name: display_name.to_string(),
        discriminator_tag: tag.to_string(),
        external_handle,
    })
}

/// Concatenated text of every descendant matching `sel`.
fn child_text(el: ElementRef<'_>, sel: &Selector) -> String {
    el.select(sel).flat_map(|child| child.text()).collect()
}

/// The handle is the last non-empty path segment of the profile URL.
fn handle_from_href(href: &str) -> Option<String> {
    let href = href.trim();
    let without_query = href.split(['?', '#']).next().unwrap_or(href);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, tag: &str, socials: &str) -> String {
        format!(
            r#"<tr>
                <td><a href="/valorant/profile/riot/x/overview">
                    <span class="v3-trnign">
                        <span class="max-w-full truncate">{name}</span>
                        <span class="v3-trnign__discriminator">{tag}</span>
                    </span>
                </a></td>
                <td>{socials}</td>
            </tr>"#
        )
    }

    fn page(rows: &[String]) -> String {
        format!(
            "<html><body><table><tbody>{}</tbody></table></body></html>",
            rows.concat()
        )
    }

    const TWITCH: &str = r#"<a aria-label="Visit twitch profile" href="https://twitch.tv/someone">tw</a>"#;

    #[test]
    fn extracts_complete_row() {
        let html = page(&[row("Sacy", "#777", TWITCH)]);
        let scan = scan_page(&html);
        assert_eq!(scan.candidates, 1);
        assert_eq!(
            scan.records,
            vec![CollectedRecord {
                display_name: "Sacy".into(),
                discriminator_tag: "777".into(),
                external_handle: "someone".into(),
            }]
        );
    }

    #[test]
    fn row_without_handle_is_dropped_but_counted() {
        let html = page(&[row("Sacy", "#777", ""), row("Less", "#BR1", TWITCH)]);
        let scan = scan_page(&html);
        assert_eq!(scan.candidates, 2);
        assert_eq!(scan.records.len(), 1);
        assert_eq!(scan.records[0].display_name, "Less");
        assert_eq!(scan.dropped(), 1);
        assert!(!scan.is_past_end());
    }

    #[test]
    fn row_without_name_is_dropped() {
        let html = page(&[row("   ", "#777", TWITCH)]);
        let scan = scan_page(&html);
        assert_eq!(scan.candidates, 1);
        assert!(scan.records.is_empty());
    }

    #[test]
    fn missing_tag_is_allowed() {
        let html = page(&[row("Boaster", "", TWITCH)]);
        let scan = scan_page(&html);
        assert_eq!(scan.records.len(), 1);
        assert_eq!(scan.records[0].discriminator_tag, "");
    }

    #[test]
    fn other_social_links_are_ignored() {
        let twitter = r#"<a aria-label="Visit twitter profile" href="https://twitter.com/x">x</a>"#;
        let html = page(&[row("Chronicle", "#fnc", twitter)]);
        assert!(scan_page(&html).records.is_empty());
    }

    #[test]
    fn page_without_rows_is_past_end() {
        let scan = scan_page("<html><body><table><tbody></tbody></table></body></html>");
        assert!(scan.is_past_end());
        assert_eq!(scan.dropped(), 0);
    }

    #[test]
    fn handle_parsing() {
        assert_eq!(handle_from_href("https://twitch.tv/tenz").as_deref(), Some("tenz"));
        assert_eq!(handle_from_href("https://www.twitch.tv/demon1/").as_deref(), Some("demon1"));
        assert_eq!(
            handle_from_href("https://twitch.tv/sick?ref=trn").as_deref(),
            Some("sick")
        );
        assert_eq!(handle_from_href(""), None);
        assert_eq!(handle_from_href("https://"), None);
    }
}
