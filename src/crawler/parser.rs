//! HTML parser for extracting links, forms and page metadata
//!
//! Parsing never fails: html5ever recovers from any malformed markup, and
//! an unusable base URL yields an empty [`ParsedPage`].

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::HashSet;
use url::Url;

/// Inline script bodies are cut to this many characters
pub const MAX_INLINE_SCRIPT_CHARS: usize = 500;

/// HTML comments are cut to this many characters
pub const MAX_COMMENT_CHARS: usize = 200;

/// Heading text is cut to this many characters
pub const MAX_HEADING_CHARS: usize = 200;

/// Field names that look like anti-CSRF tokens
pub(crate) static CSRF_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(csrf[_-]?token|authenticity[_-]?token|__requestverificationtoken|csrfmiddlewaretoken|(^|\[)_token(\]|$))",
    )
    .expect("CSRF regex is hardcoded and valid")
});

/// Field names or ids that suggest a login form
const AUTH_FIELD_NAMES: &[&str] = &["username", "email", "login", "user", "password", "pass"];

/// Action path segments that suggest a login form
const AUTH_ACTION_SEGMENTS: &[&str] = &["login", "signin", "auth", "authenticate"];

/// `<link rel>` values followed as navigation links
const FOLLOWED_LINK_RELS: &[&str] = &["alternate", "next", "prev", "canonical"];

/// Returns true if a field name looks like a CSRF token
pub fn is_csrf_field(name: &str) -> bool {
    CSRF_NAME_PATTERN.is_match(name)
}

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Navigation links, absolute, deduplicated in document order
    pub links: Vec<String>,

    pub forms: Vec<Form>,
    pub scripts: Vec<Script>,
    pub meta: Vec<MetaTag>,
    pub comments: Vec<String>,

    /// `<input>` elements outside any form
    pub inputs: Vec<FormField>,

    pub images: Vec<Image>,
    pub stylesheets: Vec<String>,
    pub headings: Vec<Heading>,

    /// Resources loaded from a host other than the page's
    pub external_resources: Vec<String>,
}

/// An HTML form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Form {
    /// Absolute submit URL (the page URL when `action` is absent)
    pub action: String,
    /// Lowercase method, `get` by default
    pub method: String,
    pub enctype: String,
    /// Every input/select/textarea in document order
    pub fields: Vec<FormField>,
    pub hidden_fields: Vec<FormField>,
    pub csrf_tokens: Vec<CsrfToken>,
    pub authentication_required: bool,
    pub file_upload: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormField {
    #[serde(rename = "type")]
    pub field_type: String,
    pub name: Option<String>,
    pub id: Option<String>,
    pub value: Option<String>,
    pub required: bool,
    pub disabled: bool,
    pub readonly: bool,
    /// Only populated for `<select>`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CsrfToken {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Script {
    pub src: Option<String>,
    #[serde(rename = "type")]
    pub script_type: Option<String>,
    /// Inline body, truncated
    pub inline: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaTag {
    pub name: Option<String>,
    pub property: Option<String>,
    pub http_equiv: Option<String>,
    pub content: Option<String>,
    pub charset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    pub src: String,
    pub alt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// Parses HTML content and extracts everything the scan records
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href>` and `<area href>`
/// - `<link href>` with rel alternate, next, prev or canonical
///
/// **Exclude:**
/// - Fragment-only hrefs (`#top`)
/// - `javascript:`, `mailto:`, `tel:`, `data:` and other non-http(s) targets
///
/// # Example
///
/// ```
/// use webrecon::crawler::parse;
///
/// let html = r#"<title>Test</title><a href="/page">Link</a><a href="/page#x">Again</a>"#;
/// let parsed = parse(html, "https://example.com/");
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links, vec!["https://example.com/page"]);
/// ```
pub fn parse(html: &str, base_url: &str) -> ParsedPage {
    let base = match Url::parse(base_url) {
        Ok(base) => base,
        Err(e) => {
            tracing::debug!("Cannot parse base URL {}: {}", base_url, e);
            return ParsedPage::default();
        }
    };

    let document = Html::parse_document(html);
    let page_host = base.host_str().map(str::to_ascii_lowercase);

    let scripts = extract_scripts(&document, &base);
    let images = extract_images(&document, &base);
    let stylesheets = extract_stylesheets(&document, &base);
    let external_resources = extract_external_resources(&document, &base, page_host.as_deref());

    ParsedPage {
        title: title_of(&document),
        links: extract_links(&document, &base),
        forms: extract_forms(&document, &base),
        scripts,
        meta: extract_meta(&document),
        comments: extract_comments(&document),
        inputs: extract_bare_inputs(&document),
        images,
        stylesheets,
        headings: extract_headings(&document),
        external_resources,
    }
}

/// Extracts the trimmed `<title>` text of an HTML document
pub fn extract_title(html: &str) -> Option<String> {
    title_of(&Html::parse_document(html))
}

/// Returns the first form of a document, resolved against `base_url`
pub fn first_form(html: &str, base_url: &str) -> Option<Form> {
    let base = Url::parse(base_url).ok()?;
    let document = Html::parse_document(html);
    let form = select(&document, "form").into_iter().next()?;
    Some(build_form(form, &base))
}

/// CSRF tokens from hidden inputs and `<meta name="csrf-token">` style tags
pub fn extract_csrf_tokens(html: &str) -> Vec<CsrfToken> {
    let document = Html::parse_document(html);
    let mut tokens: Vec<CsrfToken> = Vec::new();

    for input in select(&document, "input[name]") {
        let element = input.value();
        let (Some(name), Some(value)) = (element.attr("name"), element.attr("value")) else {
            continue;
        };
        if is_csrf_field(name) {
            tokens.push(CsrfToken {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }

    for meta in select(&document, "meta[name][content]") {
        let element = meta.value();
        let (Some(name), Some(content)) = (element.attr("name"), element.attr("content")) else {
            continue;
        };
        // <meta name="csrf-token"> is the Rails/Laravel convention
        let normalized = name.to_ascii_lowercase();
        if is_csrf_field(name) || normalized == "csrf-token" || normalized == "csrf_token" {
            tokens.push(CsrfToken {
                name: name.to_string(),
                value: content.to_string(),
            });
        }
    }

    tokens
}

fn select<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn select_within<'a>(element: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => element.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn title_of(document: &Html) -> Option<String> {
    select(document, "title")
        .into_iter()
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn attr(element: ElementRef<'_>, name: &str) -> Option<String> {
    element.value().attr(name).map(str::to_string)
}

/// Resolves an href to an absolute http(s) URL
///
/// Returns None for empty, fragment-only and non-http(s) hrefs.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);
    Some(absolute.to_string())
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut links = Vec::new();

    let mut push = |href: &str| {
        if let Some(absolute) = resolve_link(href, base_url) {
            if seen.insert(absolute.clone()) {
                links.push(absolute);
            }
        }
    };

    for element in select(document, "a[href], area[href]") {
        if let Some(href) = element.value().attr("href") {
            push(href);
        }
    }

    for element in select(document, "link[rel][href]") {
        let rel = element.value().attr("rel").unwrap_or_default().to_ascii_lowercase();
        if rel
            .split_whitespace()
            .any(|token| FOLLOWED_LINK_RELS.contains(&token))
        {
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    links
}

fn extract_forms(document: &Html, base_url: &Url) -> Vec<Form> {
    select(document, "form")
        .into_iter()
        .map(|form| build_form(form, base_url))
        .collect()
}

fn build_form(form: ElementRef<'_>, base_url: &Url) -> Form {
    let element = form.value();

    let action = element
        .attr("action")
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .and_then(|a| base_url.join(a).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| base_url.to_string());

    let method = element
        .attr("method")
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "get".to_string());

    let enctype = element
        .attr("enctype")
        .map(|e| e.trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "application/x-www-form-urlencoded".to_string());

    let fields: Vec<FormField> = select_within(form, "input, select, textarea")
        .into_iter()
        .map(build_field)
        .collect();

    let hidden_fields: Vec<FormField> = fields
        .iter()
        .filter(|f| f.field_type == "hidden")
        .cloned()
        .collect();

    let csrf_tokens = fields
        .iter()
        .filter_map(|f| {
            let name = f.name.as_deref()?;
            if !is_csrf_field(name) {
                return None;
            }
            Some(CsrfToken {
                name: name.to_string(),
                value: f.value.clone().unwrap_or_default(),
            })
        })
        .collect();

    let authentication_required = is_auth_form(&fields, &action);
    let file_upload =
        fields.iter().any(|f| f.field_type == "file") || enctype == "multipart/form-data";

    Form {
        action,
        method,
        enctype,
        fields,
        hidden_fields,
        csrf_tokens,
        authentication_required,
        file_upload,
    }
}

fn build_field(element: ElementRef<'_>) -> FormField {
    let tag = element.value().name();
    let field_type = match tag {
        "input" => element
            .value()
            .attr("type")
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "text".to_string()),
        other => other.to_string(),
    };

    let value = match tag {
        "textarea" => Some(element.text().collect::<String>()),
        _ => attr(element, "value"),
    };

    let options = if tag == "select" {
        select_within(element, "option")
            .into_iter()
            .map(|option| {
                let text = text_of(option);
                SelectOption {
                    value: attr(option, "value").unwrap_or_else(|| text.clone()),
                    text,
                    selected: option.value().attr("selected").is_some(),
                }
            })
            .collect()
    } else {
        Vec::new()
    };

    FormField {
        field_type,
        name: attr(element, "name"),
        id: attr(element, "id"),
        value,
        required: element.value().attr("required").is_some(),
        disabled: element.value().attr("disabled").is_some(),
        readonly: element.value().attr("readonly").is_some(),
        options,
    }
}

/// Login-form heuristic over fields and the action path
fn is_auth_form(fields: &[FormField], action: &str) -> bool {
    if fields.iter().any(|f| f.field_type == "password") {
        return true;
    }

    let named_like_auth = |value: &Option<String>| {
        value
            .as_deref()
            .map(|v| AUTH_FIELD_NAMES.contains(&v.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    };
    if fields
        .iter()
        .any(|f| named_like_auth(&f.name) || named_like_auth(&f.id))
    {
        return true;
    }

    let Ok(action_url) = Url::parse(action) else {
        return false;
    };
    action_url.path().split('/').any(|segment| {
        let segment = segment.to_ascii_lowercase();
        let stem = segment.split('.').next().unwrap_or_default();
        AUTH_ACTION_SEGMENTS.contains(&stem)
    })
}

fn extract_scripts(document: &Html, base_url: &Url) -> Vec<Script> {
    select(document, "script")
        .into_iter()
        .map(|element| {
            let src = element
                .value()
                .attr("src")
                .and_then(|s| base_url.join(s.trim()).ok())
                .map(|u| u.to_string());

            let inline = if src.is_none() {
                let body = element.text().collect::<String>();
                let body = body.trim();
                (!body.is_empty()).then(|| truncate(body, MAX_INLINE_SCRIPT_CHARS))
            } else {
                None
            };

            Script {
                src,
                script_type: attr(element, "type"),
                inline,
            }
        })
        .collect()
}

fn extract_meta(document: &Html) -> Vec<MetaTag> {
    select(document, "meta")
        .into_iter()
        .map(|element| MetaTag {
            name: attr(element, "name"),
            property: attr(element, "property"),
            http_equiv: attr(element, "http-equiv"),
            content: attr(element, "content"),
            charset: attr(element, "charset"),
        })
        .collect()
}

fn extract_comments(document: &Html) -> Vec<String> {
    document
        .tree
        .nodes()
        .filter_map(|node| node.value().as_comment())
        .map(|comment| comment.trim())
        .filter(|text| !text.is_empty())
        .map(|text| truncate(text, MAX_COMMENT_CHARS))
        .collect()
}

fn extract_bare_inputs(document: &Html) -> Vec<FormField> {
    select(document, "input")
        .into_iter()
        .filter(|input| {
            !input.ancestors().any(|node| {
                node.value()
                    .as_element()
                    .map_or(false, |element| element.name() == "form")
            })
        })
        .map(build_field)
        .collect()
}

fn extract_images(document: &Html, base_url: &Url) -> Vec<Image> {
    select(document, "img[src]")
        .into_iter()
        .filter_map(|element| {
            let src = element.value().attr("src")?;
            let absolute = base_url.join(src.trim()).ok()?;
            Some(Image {
                src: absolute.to_string(),
                alt: attr(element, "alt"),
            })
        })
        .collect()
}

fn extract_stylesheets(document: &Html, base_url: &Url) -> Vec<String> {
    select(document, "link[rel][href]")
        .into_iter()
        .filter(|element| {
            element
                .value()
                .attr("rel")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .split_whitespace()
                .any(|token| token == "stylesheet")
        })
        .filter_map(|element| {
            let href = element.value().attr("href")?;
            base_url.join(href.trim()).ok().map(|u| u.to_string())
        })
        .collect()
}

fn extract_headings(document: &Html) -> Vec<Heading> {
    select(document, "h1, h2, h3, h4, h5, h6")
        .into_iter()
        .filter_map(|element| {
            let level = element.value().name()[1..].parse::<u8>().ok()?;
            let text = text_of(element);
            if text.is_empty() {
                return None;
            }
            Some(Heading {
                level,
                text: truncate(&text, MAX_HEADING_CHARS),
            })
        })
        .collect()
}

fn extract_external_resources(
    document: &Html,
    base_url: &Url,
    page_host: Option<&str>,
) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut resources = Vec::new();

    let candidates = [
        ("script[src]", "src"),
        ("link[href]", "href"),
        ("img[src]", "src"),
        ("iframe[src]", "src"),
        ("source[src]", "src"),
        ("video[src]", "src"),
        ("audio[src]", "src"),
    ];

    for (css, attribute) in candidates {
        for element in select(document, css) {
            let Some(value) = element.value().attr(attribute) else {
                continue;
            };
            let Ok(absolute) = base_url.join(value.trim()) else {
                continue;
            };
            if absolute.scheme() != "http" && absolute.scheme() != "https" {
                continue;
            }
            let host = absolute.host_str().map(str::to_ascii_lowercase);
            if host.is_some() && host.as_deref() != page_host {
                let absolute = absolute.to_string();
                if seen.insert(absolute.clone()) {
                    resources.push(absolute);
                }
            }
        }
    }

    resources
}
