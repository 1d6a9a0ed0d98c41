// SPDX-License-Identifier: MIT

//! RSS article feed with full-text extraction from article pages

use super::{effective_count, Article, ArticleFeed};
use crate::error::DigestError;
use crate::retry::{retry_transient, RetryPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use reqwest::Client;
use std::time::Duration;

const SERVICE: &str = "article feed";

pub const DEFAULT_FEED_URL: &str =
    "https://habr.com/ru/rss/hubs/artificial_intelligence/articles/?fl=ru";

/// Class of the element holding an article's body
const BODY_CLASS: &str = "article-formatted-body";

static ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<item\b[^>]*>(.*?)</item>").expect("valid regex"));
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<title\b[^>]*>(.*?)</title>").expect("valid regex"));
static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<link\b[^>]*>(.*?)</link>").expect("valid regex"));
static DESCRIPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<description\b[^>]*>(.*?)</description>").expect("valid regex")
});
static PUB_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<pubDate\b[^>]*>(.*?)</pubDate>").expect("valid regex"));
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("valid regex")
});
static BODY_OPEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)<div\b[^>]*class\s*=\s*"[^"]*\b{}\b[^"]*"[^>]*>"#,
        BODY_CLASS
    ))
    .expect("valid regex")
});
static DIV_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<div\b[^>]*>|</div\s*>").expect("valid regex"));
static BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</p\s*>|</h[1-6]\s*>|</li\s*>").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));
static BLANK_LINES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+").expect("valid regex"));

/// An RSS entry before its page is fetched
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: DateTime<Utc>,
}

/// Parse RSS 2.0 `<item>` entries. Entries without a parseable `pubDate`
/// are skipped.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>, DigestError> {
    if !xml.contains("<channel") {
        return Err(DigestError::parse("feed has no <channel> element"));
    }

    let mut items = Vec::new();
    for cap in ITEM_RE.captures_iter(xml) {
        let block = &cap[1];
        let title = tag_text(&TITLE_RE, block).unwrap_or_default();
        let link = tag_text(&LINK_RE, block).unwrap_or_default();
        let summary = tag_text(&DESCRIPTION_RE, block)
            .map(|html| html_to_text(&html))
            .unwrap_or_default();

        let published = match tag_text(&PUB_DATE_RE, block)
            .and_then(|d| DateTime::parse_from_rfc2822(&d).ok())
        {
            Some(d) => d.with_timezone(&Utc),
            None => {
                log::warn!("Skipping feed item '{}' without a valid pubDate", title);
                continue;
            }
        };

        if link.is_empty() {
            log::warn!("Skipping feed item '{}' without a link", title);
            continue;
        }

        items.push(FeedItem {
            title,
            link,
            summary,
            published,
        });
    }
    Ok(items)
}

/// Keep items published on the calendar day before `today`, in feed order,
/// at most `n` of them.
pub fn select_previous_day(items: Vec<FeedItem>, today: NaiveDate, n: usize) -> Vec<FeedItem> {
    let Some(yesterday) = today.checked_sub_days(Days::new(1)) else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter(|item| item.published.date_naive() == yesterday)
        .take(n)
        .collect()
}

/// Extract the readable text of the article body container
pub fn extract_article_body(html: &str) -> Result<String, DigestError> {
    let open = BODY_OPEN_RE
        .find(html)
        .ok_or_else(|| DigestError::parse(format!("no '{}' container in page", BODY_CLASS)))?;

    let rest = &html[open.end()..];
    let mut depth = 1usize;
    let mut end = rest.len();
    for tag in DIV_TAG_RE.find_iter(rest) {
        if tag.as_str().starts_with("</") {
            depth -= 1;
            if depth == 0 {
                end = tag.start();
                break;
            }
        } else {
            depth += 1;
        }
    }

    Ok(html_to_text(&rest[..end]))
}

fn tag_text(re: &Regex, block: &str) -> Option<String> {
    let raw = re.captures(block)?.get(1)?.as_str().trim();
    let raw = raw
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(raw);
    Some(decode_entities(raw.trim()))
}

fn html_to_text(html: &str) -> String {
    let with_breaks = BREAK_RE.replace_all(html, "\n");
    let stripped = TAG_RE.replace_all(&with_breaks, "");
    let decoded = decode_entities(&stripped);
    BLANK_LINES_RE
        .replace_all(&decoded, "\n\n")
        .trim()
        .to_string()
}

/// Single pass, so `&amp;lt;` decodes to `&lt;` and not to `<`
fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            let body = &caps[1];
            let hex = body
                .strip_prefix("#x")
                .or_else(|| body.strip_prefix("#X"));
            let decoded = if let Some(hex) = hex {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(body)
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "laquo" => '«',
        "raquo" => '»',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "hellip" => '\u{2026}',
        "bull" => '\u{2022}',
        "copy" => '\u{a9}',
        _ => return None,
    };
    Some(c)
}

/// RSS feed collaborator (Habr hub feeds by default)
pub struct HabrFeed {
    client: Client,
    feed_url: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl HabrFeed {
    pub fn new(feed_url: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            feed_url: feed_url.into(),
            timeout,
            retry,
        }
    }

    async fn get_text(&self, url: &str) -> Result<String, DigestError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DigestError::transport(SERVICE, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DigestError::transport(
                SERVICE,
                format!("GET {} returned HTTP {}", url, status),
            ));
        }

        resp.text()
            .await
            .map_err(|e| DigestError::transport(SERVICE, e))
    }

    async fn get_with_retry(&self, url: &str) -> Result<String, DigestError> {
        retry_transient("article feed request", &self.retry, self.timeout, || {
            self.get_text(url)
        })
        .await
    }

    /// Fetch articles relative to a given current UTC day
    pub async fn fetch_for_day(
        &self,
        n: usize,
        today: NaiveDate,
    ) -> Result<Vec<Article>, DigestError> {
        let n = effective_count(n)?;

        let xml = self.get_with_retry(&self.feed_url).await?;
        let items = select_previous_day(parse_feed(&xml)?, today, n);
        log::info!(
            "Feed {} has {} article(s) from the previous day",
            self.feed_url,
            items.len()
        );

        let mut articles = Vec::with_capacity(items.len());
        for item in items {
            let page = self.get_with_retry(&item.link).await?;
            let full_text = extract_article_body(&page)?;
            articles.push(Article {
                title: item.title,
                link: item.link,
                full_text,
                summary: item.summary,
            });
        }
        Ok(articles)
    }
}

#[async_trait]
impl ArticleFeed for HabrFeed {
    async fn fetch(&self, n: usize) -> Result<Vec<Article>, DigestError> {
        self.fetch_for_day(n, Utc::now().date_naive()).await
    }
}
