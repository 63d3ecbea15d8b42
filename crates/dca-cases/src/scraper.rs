use anyhow::{anyhow, Result};
use dca_crawler::Scrapable;
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::record::CaseRecord;

pub const ITEM_SELECTOR: &str = "a.b-archive__database-item";

lazy_static! {
    static ref ITEM_LINK: Selector = Selector::parse("a.b-archive__database-item[href]").unwrap();
    static ref PAGINATION_ITEM: Selector = Selector::parse("a.b-pagination__item").unwrap();
    static ref RESULTS_COUNT: Selector = Selector::parse("div.b-archive__results-count").unwrap();
    static ref TITLE: Selector = Selector::parse("title").unwrap();
    static ref DETAILS: Selector = Selector::parse(".b-report__details-list li").unwrap();
    static ref ANCHOR: Selector = Selector::parse("a").unwrap();
    static ref SPAN: Selector = Selector::parse("span").unwrap();
    static ref SUMMARY: Selector = Selector::parse("div.b-report__summary").unwrap();
    static ref RESPONSE: Selector = Selector::parse("div.b-report__response").unwrap();
    static ref TEXT_BLOCK: Selector = Selector::parse("div.b-text").unwrap();
}

const TITLE_PREFIX: &str = "Disinfo: ";
const NEW_TAB_NOTICE: &str = "(opens in a new tab)";

/// Case extraction for the EUvsDisinfo database.
#[derive(Debug, Default)]
pub struct CaseScraper;

impl Scrapable for CaseScraper {
    type Config = ();
    type Record = CaseRecord;

    fn new(_config: &()) -> Result<Self> {
        Ok(Self)
    }

    fn item_selector(&self) -> &str {
        ITEM_SELECTOR
    }

    fn item_links(&self, page: &str, page_url: &str) -> Vec<String> {
        let base = Url::parse(page_url).ok();
        let document = Html::parse_document(page);
        document
            .select(&ITEM_LINK)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| match &base {
                Some(base) => base.join(href).ok().map(|url| url.to_string()),
                None => Some(href.to_string()),
            })
            .collect()
    }

    fn last_page(&self, page: &str) -> Option<usize> {
        let document = Html::parse_document(page);
        document
            .select(&PAGINATION_ITEM)
            .filter_map(|a| text_of(a).parse::<usize>().ok())
            .last()
    }

    fn total_items(&self, page: &str) -> Option<usize> {
        let document = Html::parse_document(page);
        let banner = document.select(&RESULTS_COUNT).next()?;
        text_of(banner)
            .split_whitespace()
            .next()?
            .replace(',', "")
            .parse()
            .ok()
    }

    fn scrap(&mut self, page: &str, url: &str) -> Result<CaseRecord> {
        let document = Html::parse_document(page);

        let title = document
            .select(&TITLE)
            .next()
            .map(text_of)
            .ok_or_else(|| anyhow!("No title found in {url}"))?;

        let mut record = CaseRecord {
            title: non_empty(title.replace(TITLE_PREFIX, "")),
            ..Default::default()
        };

        for li in document.select(&DETAILS) {
            let text = text_of(li);
            if text.contains("Outlet:") {
                record.outlet = first_text(li, &ANCHOR)
                    .and_then(|outlet| non_empty(outlet.replace(NEW_TAB_NOTICE, "")));
            } else if text.contains("Date of publication:") {
                record.date_of_publication = first_text(li, &SPAN);
            } else if text.contains("Article language(s):") {
                record.article_languages = first_text(li, &SPAN);
            } else if text.contains("Countries / regions discussed:") {
                record.countries_discussed = first_text(li, &SPAN);
            }
        }

        record.summary = document
            .select(&SUMMARY)
            .next()
            .and_then(|section| first_text(section, &TEXT_BLOCK));

        record.response = document
            .select(&RESPONSE)
            .next()
            .and_then(|section| section.select(&TEXT_BLOCK).next())
            .and_then(response_text);

        Ok(record)
    }
}

/// Collapses every whitespace run, line breaks included, to a single space.
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(text: String) -> Option<String> {
    let text = normalize(&text);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn text_of(element: ElementRef) -> String {
    normalize(&element.text().collect::<String>())
}

fn first_text(element: ElementRef, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|found| non_empty(text_of(found)))
}

// Paragraphs, links and bare text directly under the response block.
fn response_text(block: ElementRef) -> Option<String> {
    let parts = block
        .children()
        .filter_map(|child| match child.value() {
            Node::Text(text) => Some(normalize(text)),
            Node::Element(el) if matches!(el.name(), "p" | "a") => {
                ElementRef::wrap(child).map(text_of)
            }
            _ => None,
        })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();
    non_empty(parts.join(" "))
}
