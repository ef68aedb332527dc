//! Rule-based technology detection and security header audit
//!
//! Each signature lists header rules and body rules. Header rules are tried
//! first; body rules only run when no header rule matched. All patterns are
//! case-insensitive, and a first capture group, when present, is the version.

use crate::crawler::spider::FetchResult;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Technology category of a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    WebServer,
    Language,
    Framework,
    Cms,
    Javascript,
    CssFramework,
    Analytics,
    Cdn,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebServer => "web_server",
            Self::Language => "language",
            Self::Framework => "framework",
            Self::Cms => "cms",
            Self::Javascript => "javascript",
            Self::CssFramework => "css_framework",
            Self::Analytics => "analytics",
            Self::Cdn => "cdn",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Signature {
    name: &'static str,
    category: Category,
    /// (lowercase header name, pattern)
    headers: &'static [(&'static str, &'static str)],
    body: &'static [&'static str],
}

/// Signature table; order decides the CMS tie-break (first match wins)
const SIGNATURES: &[Signature] = &[
    // ===== Web servers =====
    Signature {
        name: "nginx",
        category: Category::WebServer,
        headers: &[("server", r"nginx(?:/([\d.]+))?")],
        body: &[],
    },
    Signature {
        name: "Apache",
        category: Category::WebServer,
        headers: &[("server", r"apache(?:/([\d.]+))?")],
        body: &[],
    },
    Signature {
        name: "Microsoft IIS",
        category: Category::WebServer,
        headers: &[("server", r"microsoft-iis(?:/([\d.]+))?")],
        body: &[],
    },
    Signature {
        name: "LiteSpeed",
        category: Category::WebServer,
        headers: &[("server", r"litespeed")],
        body: &[],
    },
    Signature {
        name: "Caddy",
        category: Category::WebServer,
        headers: &[("server", r"caddy")],
        body: &[],
    },
    Signature {
        name: "OpenResty",
        category: Category::WebServer,
        headers: &[("server", r"openresty(?:/([\d.]+))?")],
        body: &[],
    },
    // ===== CDNs =====
    Signature {
        name: "Cloudflare",
        category: Category::Cdn,
        headers: &[("server", r"cloudflare"), ("cf-ray", r".+")],
        body: &[],
    },
    Signature {
        name: "Fastly",
        category: Category::Cdn,
        headers: &[("x-fastly-request-id", r".+"), ("x-served-by", r"cache-")],
        body: &[],
    },
    Signature {
        name: "Akamai",
        category: Category::Cdn,
        headers: &[("server", r"akamaighost"), ("x-akamai-transformed", r".+")],
        body: &[],
    },
    Signature {
        name: "Amazon CloudFront",
        category: Category::Cdn,
        headers: &[("x-amz-cf-id", r".+"), ("via", r"cloudfront")],
        body: &[],
    },
    Signature {
        name: "Varnish",
        category: Category::Cdn,
        headers: &[("x-varnish", r".+"), ("via", r"varnish")],
        body: &[],
    },
    // ===== Languages =====
    Signature {
        name: "PHP",
        category: Category::Language,
        headers: &[
            ("x-powered-by", r"php(?:/([\d.]+))?"),
            ("set-cookie", r"phpsessid"),
        ],
        body: &[],
    },
    Signature {
        name: "ASP.NET",
        category: Category::Language,
        headers: &[
            ("x-aspnet-version", r"([\d.]+)"),
            ("x-powered-by", r"asp\.net"),
            ("set-cookie", r"asp\.net_sessionid"),
        ],
        body: &[r"__viewstate"],
    },
    Signature {
        name: "Java",
        category: Category::Language,
        headers: &[
            ("set-cookie", r"jsessionid"),
            ("x-powered-by", r"(?:servlet|jsp)"),
        ],
        body: &[],
    },
    Signature {
        name: "Node.js",
        category: Category::Language,
        headers: &[("x-powered-by", r"(?:express|next\.js)")],
        body: &[],
    },
    Signature {
        name: "Python",
        category: Category::Language,
        headers: &[("server", r"(?:gunicorn|uvicorn|werkzeug|wsgiserver)")],
        body: &[],
    },
    Signature {
        name: "Ruby",
        category: Category::Language,
        headers: &[
            ("server", r"(?:puma|unicorn|passenger)"),
            ("x-powered-by", r"phusion passenger"),
        ],
        body: &[],
    },
    // ===== Frameworks =====
    Signature {
        name: "Express",
        category: Category::Framework,
        headers: &[("x-powered-by", r"express")],
        body: &[],
    },
    Signature {
        name: "Next.js",
        category: Category::Framework,
        headers: &[("x-powered-by", r"next\.js(?: ([\d.]+))?")],
        body: &[r"__next_data__", r"/_next/static/"],
    },
    Signature {
        name: "Nuxt.js",
        category: Category::Framework,
        headers: &[],
        body: &[r"window\.__nuxt__", r"/_nuxt/"],
    },
    Signature {
        name: "Django",
        category: Category::Framework,
        headers: &[("set-cookie", r"csrftoken=")],
        body: &[r"csrfmiddlewaretoken", r"__admin_media_prefix__"],
    },
    Signature {
        name: "Flask",
        category: Category::Framework,
        headers: &[("server", r"werkzeug(?:/([\d.]+))?")],
        body: &[],
    },
    Signature {
        name: "Laravel",
        category: Category::Framework,
        headers: &[("set-cookie", r"laravel_session")],
        body: &[],
    },
    Signature {
        name: "Ruby on Rails",
        category: Category::Framework,
        headers: &[("x-powered-by", r"rails")],
        body: &[r#"name="csrf-param" content="authenticity_token""#],
    },
    Signature {
        name: "ASP.NET MVC",
        category: Category::Framework,
        headers: &[("x-aspnetmvc-version", r"([\d.]+)")],
        body: &[],
    },
    Signature {
        name: "Spring",
        category: Category::Framework,
        headers: &[("x-application-context", r".+")],
        body: &[],
    },
    // ===== CMS =====
    Signature {
        name: "WordPress",
        category: Category::Cms,
        headers: &[("link", r"rel=.https://api\.w\.org/")],
        body: &[
            r#"<meta[^>]+generator[^>]+wordpress ?([\d.]+)?"#,
            r"/wp-content/",
            r"/wp-includes/",
        ],
    },
    Signature {
        name: "Drupal",
        category: Category::Cms,
        headers: &[
            ("x-generator", r"drupal(?: ([\d.]+))?"),
            ("x-drupal-cache", r".+"),
        ],
        body: &[r"drupal-settings-json", r"/sites/default/files/"],
    },
    Signature {
        name: "Joomla",
        category: Category::Cms,
        headers: &[],
        body: &[r#"<meta[^>]+generator[^>]+joomla"#, r"/media/jui/"],
    },
    Signature {
        name: "Shopify",
        category: Category::Cms,
        headers: &[("x-shopid", r".+")],
        body: &[r"cdn\.shopify\.com"],
    },
    Signature {
        name: "Magento",
        category: Category::Cms,
        headers: &[("x-magento-cache-debug", r".+")],
        body: &[r"mage/cookies", r"magento_"],
    },
    Signature {
        name: "Ghost",
        category: Category::Cms,
        headers: &[],
        body: &[r#"<meta[^>]+generator[^>]+ghost ?([\d.]+)?"#],
    },
    // ===== JavaScript libraries =====
    Signature {
        name: "jQuery",
        category: Category::Javascript,
        headers: &[],
        body: &[r"jquery(?:[-.]?(\d+(?:\.\d+)+))?(?:\.slim)?(?:\.min)?\.js"],
    },
    Signature {
        name: "React",
        category: Category::Javascript,
        headers: &[],
        body: &[r"data-reactroot", r"react(?:-dom)?(?:\.production)?(?:\.min)?\.js"],
    },
    Signature {
        name: "Vue.js",
        category: Category::Javascript,
        headers: &[],
        body: &[r"vue(?:\.runtime)?(?:\.global)?(?:\.min)?\.js", r"data-v-[0-9a-f]{8}"],
    },
    Signature {
        name: "Angular",
        category: Category::Javascript,
        headers: &[],
        body: &[r#"ng-version="([\d.]+)""#],
    },
    Signature {
        name: "AngularJS",
        category: Category::Javascript,
        headers: &[],
        body: &[r"angular(?:\.min)?\.js", r"\bng-app\b"],
    },
    // ===== CSS frameworks =====
    Signature {
        name: "Bootstrap",
        category: Category::CssFramework,
        headers: &[],
        body: &[r"bootstrap(?:[-.@/](\d+(?:\.\d+)+))?[^\s]*?(?:\.min)?\.(?:css|js)"],
    },
    Signature {
        name: "Tailwind CSS",
        category: Category::CssFramework,
        headers: &[],
        body: &[r"tailwind(?:css)?(?:\.min)?\.css", r"cdn\.tailwindcss\.com"],
    },
    Signature {
        name: "Bulma",
        category: Category::CssFramework,
        headers: &[],
        body: &[r"bulma(?:\.min)?\.css"],
    },
    Signature {
        name: "Foundation",
        category: Category::CssFramework,
        headers: &[],
        body: &[r"foundation(?:\.min)?\.css"],
    },
    // ===== Analytics =====
    Signature {
        name: "Google Analytics",
        category: Category::Analytics,
        headers: &[],
        body: &[
            r"google-analytics\.com/(?:ga|analytics)\.js",
            r#"gtag\(\s*['"]config['"]\s*,\s*['"](?:ua|g)-"#,
        ],
    },
    Signature {
        name: "Google Tag Manager",
        category: Category::Analytics,
        headers: &[],
        body: &[r"googletagmanager\.com/gtm\.js", r"\bgtm-[a-z0-9]{4,}\b"],
    },
    Signature {
        name: "Facebook Pixel",
        category: Category::Analytics,
        headers: &[],
        body: &[r"connect\.facebook\.net/[^'\x22]*/fbevents\.js", r"\bfbq\("],
    },
    Signature {
        name: "Hotjar",
        category: Category::Analytics,
        headers: &[],
        body: &[r"static\.hotjar\.com"],
    },
    Signature {
        name: "Matomo",
        category: Category::Analytics,
        headers: &[],
        body: &[r"(?:matomo|piwik)\.js", r"_paq\.push"],
    },
];

struct CompiledSignature {
    name: &'static str,
    category: Category,
    headers: Vec<(&'static str, Regex)>,
    body: Vec<Regex>,
}

fn compile(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){}", pattern)).expect("signature regex is hardcoded and valid")
}

static COMPILED: Lazy<Vec<CompiledSignature>> = Lazy::new(|| {
    SIGNATURES
        .iter()
        .map(|sig| CompiledSignature {
            name: sig.name,
            category: sig.category,
            headers: sig.headers.iter().map(|(h, p)| (*h, compile(p))).collect(),
            body: sig.body.iter().map(|p| compile(p)).collect(),
        })
        .collect()
});

/// Security headers audited on every response, most important first
const SECURITY_HEADERS: &[&str] = &[
    "strict-transport-security",
    "content-security-policy",
    "x-frame-options",
    "x-content-type-options",
    "referrer-policy",
    "permissions-policy",
    "x-xss-protection",
    "cross-origin-opener-policy",
    "cross-origin-resource-policy",
    "cross-origin-embedder-policy",
];

/// Remediation text for the three headers that matter most
const REMEDIATIONS: &[(&str, &str)] = &[
    (
        "strict-transport-security",
        "Add 'Strict-Transport-Security: max-age=31536000; includeSubDomains' to HTTPS responses so browsers refuse plain-HTTP connections.",
    ),
    (
        "content-security-policy",
        "Define a Content-Security-Policy restricting script, style and frame sources (start with default-src 'self') to limit XSS impact.",
    ),
    (
        "x-frame-options",
        "Add 'X-Frame-Options: DENY' or 'SAMEORIGIN' (or CSP frame-ancestors) to prevent clickjacking.",
    ),
];

/// One detected technology
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Technology {
    pub name: String,
    pub category: Category,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Remediation {
    pub header: String,
    pub advice: String,
}

/// Presence audit over the fixed security-header checklist
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecurityHeaderAudit {
    /// Present headers and their values
    pub present: BTreeMap<String, String>,
    pub missing: Vec<String>,
    pub remediations: Vec<Remediation>,
    /// Share of checklist headers present, 0-100
    pub score: u8,
}

/// Detected technologies and header findings for one page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TechnologyFingerprint {
    /// Raw `Server` header value
    pub server_software: Option<String>,
    /// Every detection, in signature-table order
    pub technologies: Vec<Technology>,
    pub web_servers: Vec<String>,
    pub programming_language: Vec<String>,
    pub framework: Vec<String>,
    pub cms: Option<String>,
    pub javascript_libraries: Vec<String>,
    pub css_frameworks: Vec<String>,
    pub analytics: Vec<String>,
    pub cdn: Vec<String>,
    pub security_headers: SecurityHeaderAudit,
    pub security_score: u8,
}

impl TechnologyFingerprint {
    pub fn contains(&self, name: &str, category: Category) -> bool {
        self.technologies
            .iter()
            .any(|t| t.name == name && t.category == category)
    }
}

/// Technology fingerprinter
#[derive(Debug, Clone, Copy, Default)]
pub struct Fingerprinter;

impl Fingerprinter {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, result: &FetchResult) -> TechnologyFingerprint {
        self.analyze_parts(&result.headers, result.body.as_deref())
    }

    /// Fingerprints raw headers and an optional body
    ///
    /// Header names are matched case-insensitively; a missing or empty body
    /// still yields header-based detections and the security audit.
    pub fn analyze_parts(
        &self,
        headers: &BTreeMap<String, String>,
        body: Option<&str>,
    ) -> TechnologyFingerprint {
        let headers: BTreeMap<String, &str> = headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
            .collect();
        let body = body.unwrap_or_default();

        let mut fingerprint = TechnologyFingerprint {
            server_software: headers.get("server").map(|s| s.trim().to_string()),
            ..Default::default()
        };

        for signature in COMPILED.iter() {
            let Some(version) = detect(signature, &headers, body) else {
                continue;
            };
            record(&mut fingerprint, signature, version);
        }

        fingerprint.security_headers = audit_security_headers(&headers);
        fingerprint.security_score = fingerprint.security_headers.score;
        fingerprint
    }
}

/// Some(version) when the signature matches
fn detect(
    signature: &CompiledSignature,
    headers: &BTreeMap<String, &str>,
    body: &str,
) -> Option<Option<String>> {
    for (name, pattern) in &signature.headers {
        if let Some(value) = headers.get(*name) {
            if let Some(captures) = pattern.captures(value) {
                return Some(captures.get(1).map(|m| m.as_str().to_string()));
            }
        }
    }

    if body.is_empty() {
        return None;
    }

    for pattern in &signature.body {
        if let Some(captures) = pattern.captures(body) {
            return Some(captures.get(1).map(|m| m.as_str().to_string()));
        }
    }

    None
}

fn record(fingerprint: &mut TechnologyFingerprint, signature: &CompiledSignature, version: Option<String>) {
    let name = signature.name.to_string();

    let bucket = match signature.category {
        Category::Cms => {
            if fingerprint.cms.is_none() {
                fingerprint.cms = Some(name.clone());
            }
            None
        }
        Category::WebServer => Some(&mut fingerprint.web_servers),
        Category::Language => Some(&mut fingerprint.programming_language),
        Category::Framework => Some(&mut fingerprint.framework),
        Category::Javascript => Some(&mut fingerprint.javascript_libraries),
        Category::CssFramework => Some(&mut fingerprint.css_frameworks),
        Category::Analytics => Some(&mut fingerprint.analytics),
        Category::Cdn => Some(&mut fingerprint.cdn),
    };
    if let Some(bucket) = bucket {
        if !bucket.contains(&name) {
            bucket.push(name.clone());
        }
    }

    fingerprint.technologies.push(Technology {
        name,
        category: signature.category,
        version,
    });
}

fn audit_security_headers(headers: &BTreeMap<String, &str>) -> SecurityHeaderAudit {
    let mut audit = SecurityHeaderAudit::default();

    for header in SECURITY_HEADERS {
        match headers.get(*header) {
            Some(value) => {
                audit.present.insert(header.to_string(), value.to_string());
            }
            None => audit.missing.push(header.to_string()),
        }
    }

    audit.remediations = REMEDIATIONS
        .iter()
        .filter(|(header, _)| audit.missing.iter().any(|m| m == header))
        .map(|(header, advice)| Remediation {
            header: header.to_string(),
            advice: advice.to_string(),
        })
        .collect();

    audit.score = (audit.present.len() * 100 / SECURITY_HEADERS.len()) as u8;
    audit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_all_signatures_compile() {
        assert_eq!(COMPILED.len(), SIGNATURES.len());
    }

    #[test]
    fn test_nginx_server_header() {
        let fp = Fingerprinter::new().analyze_parts(&headers(&[("Server", "nginx/1.18.0")]), None);

        assert!(fp.contains("nginx", Category::WebServer));
        assert_eq!(fp.server_software.as_deref(), Some("nginx/1.18.0"));
        let nginx = fp.technologies.iter().find(|t| t.name == "nginx").unwrap();
        assert_eq!(nginx.version.as_deref(), Some("1.18.0"));
        assert_eq!(nginx.category.as_str(), "web_server");
    }

    #[test]
    fn test_header_only_input_is_valid() {
        let fp = Fingerprinter::new().analyze_parts(
            &headers(&[("x-powered-by", "PHP/8.1.2"), ("cf-ray", "abc-LHR")]),
            Some(""),
        );
        assert_eq!(fp.programming_language, vec!["PHP"]);
        assert_eq!(fp.cdn, vec!["Cloudflare"]);
        assert!(fp.cms.is_none());
        assert_eq!(fp.security_score, 0);
        assert_eq!(fp.security_headers.missing.len(), 10);
    }

    #[test]
    fn test_body_detections() {
        let body = r#"
            <meta name="generator" content="WordPress 6.4.2">
            <link rel="stylesheet" href="/wp-content/themes/x/bootstrap.min.css">
            <script src="https://code.jquery.com/jquery-3.6.0.min.js"></script>
            <script async src="https://www.googletagmanager.com/gtm.js?id=GTM-ABC123"></script>
        "#;
        let fp = Fingerprinter::new().analyze_parts(&BTreeMap::new(), Some(body));

        assert_eq!(fp.cms.as_deref(), Some("WordPress"));
        let wordpress = fp.technologies.iter().find(|t| t.name == "WordPress").unwrap();
        assert_eq!(wordpress.version.as_deref(), Some("6.4.2"));

        let jquery = fp.technologies.iter().find(|t| t.name == "jQuery").unwrap();
        assert_eq!(jquery.version.as_deref(), Some("3.6.0"));

        assert!(fp.css_frameworks.contains(&"Bootstrap".to_string()));
        assert!(fp.analytics.contains(&"Google Tag Manager".to_string()));
        assert!(fp.server_software.is_none());
    }

    #[test]
    fn test_cms_first_registered_wins() {
        // matches both WordPress and Drupal; WordPress comes first in the table
        let body = "/sites/default/files/logo.png /wp-content/uploads/a.png";
        let fp = Fingerprinter::new().analyze_parts(&BTreeMap::new(), Some(body));
        assert_eq!(fp.cms.as_deref(), Some("WordPress"));
        assert!(fp.contains("Drupal", Category::Cms));
    }

    #[test]
    fn test_header_rules_take_precedence_for_version() {
        let fp = Fingerprinter::new().analyze_parts(
            &headers(&[("x-generator", "Drupal 10 (https://www.drupal.org)")]),
            Some("/sites/default/files/"),
        );
        let drupal = fp.technologies.iter().find(|t| t.name == "Drupal").unwrap();
        assert_eq!(drupal.version.as_deref(), Some("10"));
        assert_eq!(fp.technologies.iter().filter(|t| t.name == "Drupal").count(), 1);
    }

    #[test]
    fn test_security_audit() {
        let fp = Fingerprinter::new().analyze_parts(
            &headers(&[
                ("Strict-Transport-Security", "max-age=63072000"),
                ("X-Content-Type-Options", "nosniff"),
                ("Referrer-Policy", "no-referrer"),
            ]),
            None,
        );
        let audit = &fp.security_headers;
        assert_eq!(audit.score, 30);
        assert_eq!(fp.security_score, 30);
        assert_eq!(audit.present["strict-transport-security"], "max-age=63072000");
        assert_eq!(audit.missing.len(), 7);

        let advised: Vec<&str> = audit.remediations.iter().map(|r| r.header.as_str()).collect();
        assert_eq!(advised, vec!["content-security-policy", "x-frame-options"]);
    }

    #[test]
    fn test_full_score() {
        let all: Vec<(&str, &str)> = SECURITY_HEADERS.iter().map(|h| (*h, "x")).collect();
        let fp = Fingerprinter::new().analyze_parts(&headers(&all), None);
        assert_eq!(fp.security_score, 100);
        assert!(fp.security_headers.remediations.is_empty());
    }

    #[test]
    fn test_category_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Category::CssFramework).unwrap(),
            "\"css_framework\""
        );
    }
}
