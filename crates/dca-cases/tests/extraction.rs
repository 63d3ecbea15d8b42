use dca_cases::dca_crawler::{has_match, Scrapable};
use dca_cases::{CaseRecord, CaseScraper, ITEM_SELECTOR};

const CASE: &str = include_str!("fixtures/case.html");
const LISTING: &str = include_str!("fixtures/listing.html");

const LISTING_URL: &str =
    "https://euvsdisinfo.eu/disinformation-cases/page/2/?view=grid&numberposts=60&sort=desc";

#[test]
fn extracts_case_page() {
    let mut scraper = CaseScraper::new(&()).unwrap();
    let record = scraper
        .scrap(CASE, "https://euvsdisinfo.eu/report/the-west-is-preparing-a-provocation/")
        .unwrap();

    assert_eq!(
        record,
        CaseRecord {
            title: Some("The West is preparing a provocation in the Baltic".into()),
            outlet: Some("example.org".into()),
            date_of_publication: Some("14.03.2023".into()),
            article_languages: Some("Russian, German".into()),
            countries_discussed: Some("Lithuania, Latvia".into()),
            summary: Some(
                "The article claims that NATO is preparing a staged incident. \
                 It cites unnamed sources."
                    .into()
            ),
            response: Some(
                "A recurring pro-Kremlin narrative about Western aggression. \
                 See earlier similar cases on this topic."
                    .into()
            ),
        }
    );
}

#[test]
fn absent_sections_are_none() {
    let page = r#"
        <html><head><title>Disinfo: Short case</title></head>
        <body>
          <ul class="b-report__details-list">
            <li>Date of publication: <span>01.02.2020</span></li>
          </ul>
        </body></html>
    "#;
    let record = CaseScraper.scrap(page, "https://x/report/short/").unwrap();

    assert_eq!(record.title.as_deref(), Some("Short case"));
    assert_eq!(record.date_of_publication.as_deref(), Some("01.02.2020"));
    assert_eq!(record.outlet, None);
    assert_eq!(record.summary, None);
    assert_eq!(record.response, None);
}

#[test]
fn reads_listing_page() {
    let scraper = CaseScraper;

    assert!(has_match(LISTING, ITEM_SELECTOR).unwrap());
    assert!(!has_match(CASE, ITEM_SELECTOR).unwrap());

    assert_eq!(
        scraper.item_links(LISTING, LISTING_URL),
        vec![
            "https://euvsdisinfo.eu/report/the-west-is-preparing-a-provocation/",
            "https://euvsdisinfo.eu/report/ukraine-is-a-failed-state/",
            "https://euvsdisinfo.eu/disinformation-cases/report/sanctions-hurt-only-europe/",
        ]
    );
    assert_eq!(scraper.last_page(LISTING), Some(3));
    assert_eq!(scraper.total_items(LISTING), Some(132));
}
