//! Atom feed parsing for arXiv query responses

use super::ids::to_short_id;
use crate::error::{Error, Result};
use crate::models::Paper;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};
use url::Url;

/// Entry ids the API uses to report a malformed query
const API_ERROR_MARKER: &str = "/api/errors";

#[derive(Default)]
struct EntryBuilder {
    id: Option<String>,
    title: String,
    summary: String,
    comments: Option<String>,
    published: Option<String>,
    pdf_uri: Option<String>,
    authors: Vec<String>,
    categories: Vec<String>,
}

impl EntryBuilder {
    fn build(self) -> Option<Paper> {
        let long_id = self.id?;
        if long_id.contains(API_ERROR_MARKER) {
            warn!("Catalog reported an error entry: {} ({})", self.summary, long_id);
            return None;
        }

        let pdf_uri = self.pdf_uri.and_then(|href| match Url::parse(&href) {
            Ok(url) => Some(url),
            Err(e) => {
                debug!("Ignoring unparsable PDF link '{}': {}", href, e);
                None
            }
        });

        Some(Paper {
            id: to_short_id(&long_id).to_string(),
            title: self.title,
            summary: self.summary,
            comments: self.comments.filter(|c| !c.is_empty()),
            pdf_uri,
            published: parse_published(self.published.as_deref()),
            authors: self.authors,
            categories: self.categories,
        })
    }
}

/// Parse a timestamp, falling back to the Unix epoch
fn parse_published(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn parse_error(e: impl std::fmt::Display) -> Error {
    Error::CatalogParse(e.to_string())
}

/// Value of the attribute with local name `key`, unescaped
fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(parse_error)?;
        if attr.key.local_name().as_ref() == key {
            let value = attr.unescape_value().map_err(parse_error)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Handle attribute-only elements (`link`, `category`) inside an entry
fn apply_attributes(entry: &mut EntryBuilder, element: &BytesStart<'_>) -> Result<()> {
    match element.local_name().as_ref() {
        b"category" => {
            if let Some(term) = attribute(element, b"term")? {
                entry.categories.push(term);
            }
        }
        b"link" => {
            if attribute(element, b"title")?.as_deref() == Some("pdf") {
                entry.pdf_uri = attribute(element, b"href")?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Parse one page of an Atom feed into papers, in document order.
///
/// Elements are matched by local name, so namespaced children such as
/// `arxiv:comment` are picked up without namespace resolution.
pub fn parse_feed(xml: &str) -> Result<Vec<Paper>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut entry: Option<EntryBuilder> = None;
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(parse_error)? {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"entry" {
                    entry = Some(EntryBuilder::default());
                } else if let Some(current) = entry.as_mut() {
                    apply_attributes(current, &e)?;
                }
                path.push(name);
                text.clear();
            }
            Event::Empty(e) => {
                if let Some(current) = entry.as_mut() {
                    apply_attributes(current, &e)?;
                }
            }
            Event::Text(t) => {
                if entry.is_some() {
                    text.push_str(&t.unescape().map_err(parse_error)?);
                }
            }
            Event::CData(c) => {
                if entry.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                let name = path.pop().unwrap_or_default();
                let parent = path.last().map(Vec::as_slice);

                if name == b"entry" {
                    if let Some(done) = entry.take() {
                        match done.build() {
                            Some(paper) => papers.push(paper),
                            None => debug!("Skipping entry without a usable id"),
                        }
                    }
                } else if let Some(current) = entry.as_mut() {
                    let value = text.trim().to_string();
                    match (name.as_slice(), parent) {
                        (b"id", Some(b"entry")) => current.id = Some(value),
                        (b"title", Some(b"entry")) => current.title = value,
                        (b"summary", Some(b"entry")) => current.summary = value,
                        (b"comment", Some(b"entry")) => current.comments = Some(value),
                        (b"published", Some(b"entry")) => current.published = Some(value),
                        (b"name", Some(b"author")) => current.authors.push(value),
                        _ => {}
                    }
                }
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if entry.is_some() {
        return Err(Error::CatalogParse("feed ended inside an entry".to_string()));
    }

    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query: id_list=2107.05580</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/2107.05580v1</id>
    <published>2021-07-12T17:02:45Z</published>
    <title>  Attention &amp; Memory
      in Transformers </title>
    <summary>  We study things.  </summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name><arxiv:affiliation>Bletchley</arxiv:affiliation></author>
    <arxiv:comment>12 pages, 3 figures</arxiv:comment>
    <link href="http://arxiv.org/abs/2107.05580v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2107.05580v1" rel="related" type="application/pdf"/>
    <arxiv:primary_category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
    <category term="stat.ML" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/quant-ph/0201082v1</id>
    <published>not a date</published>
    <title>Old Style</title>
    <summary>Second.</summary>
    <author><name>Niels Bohr</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_fields() {
        let papers = parse_feed(FEED).unwrap();
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.id, "2107.05580v1");
        assert!(first.title.starts_with("Attention & Memory"));
        assert_eq!(first.summary, "We study things.");
        assert_eq!(first.comments.as_deref(), Some("12 pages, 3 figures"));
        assert_eq!(first.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(first.categories, vec!["cs.LG", "stat.ML"]);
        assert_eq!(
            first.pdf_uri.as_ref().map(Url::as_str),
            Some("http://arxiv.org/pdf/2107.05580v1")
        );
        assert_eq!(first.published.to_rfc3339(), "2021-07-12T17:02:45+00:00");
    }

    #[test]
    fn test_missing_fields_fall_back() {
        let papers = parse_feed(FEED).unwrap();
        let second = &papers[1];
        assert_eq!(second.id, "quant-ph/0201082v1");
        assert_eq!(second.published, DateTime::<Utc>::UNIX_EPOCH);
        assert!(second.pdf_uri.is_none());
        assert!(second.comments.is_none());
        assert!(second.categories.is_empty());
    }

    #[test]
    fn test_empty_feed() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>empty</title></feed>"#;
        assert!(parse_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn test_error_entries_are_skipped() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
          <entry>
            <id>http://arxiv.org/api/errors#incorrect_id_format_for_bogus</id>
            <title>Error</title>
            <summary>incorrect id format for bogus</summary>
          </entry>
        </feed>"#;
        assert!(parse_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let xml = "<feed><entry><id>x</id></title></entry></feed>";
        assert!(matches!(parse_feed(xml), Err(Error::CatalogParse(_))));
    }
}
