use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// CSP source keywords.
pub const SELF: &str = "'self'";
pub const NONE: &str = "'none'";
pub const UNSAFE_INLINE: &str = "'unsafe-inline'";
pub const UNSAFE_EVAL: &str = "'unsafe-eval'";

/// Every directive a [`Csp`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    DefaultSrc,
    ScriptSrc,
    StyleSrc,
    ImgSrc,
    ConnectSrc,
    FontSrc,
    ObjectSrc,
    MediaSrc,
    FrameSrc,
    ChildSrc,
    FormAction,
    FrameAncestors,
    BaseUri,
    Sandbox,
    PluginTypes,
    ReportUri,
    ReportTo,
    WorkerSrc,
    ManifestSrc,
    PrefetchSrc,
    NavigateTo,
    BlockAllMixedContent,
    UpgradeInsecureRequests,
}

impl Directive {
    pub const ALL: [Directive; 23] = [
        Directive::DefaultSrc,
        Directive::ScriptSrc,
        Directive::StyleSrc,
        Directive::ImgSrc,
        Directive::ConnectSrc,
        Directive::FontSrc,
        Directive::ObjectSrc,
        Directive::MediaSrc,
        Directive::FrameSrc,
        Directive::ChildSrc,
        Directive::FormAction,
        Directive::FrameAncestors,
        Directive::BaseUri,
        Directive::Sandbox,
        Directive::PluginTypes,
        Directive::ReportUri,
        Directive::ReportTo,
        Directive::WorkerSrc,
        Directive::ManifestSrc,
        Directive::PrefetchSrc,
        Directive::NavigateTo,
        Directive::BlockAllMixedContent,
        Directive::UpgradeInsecureRequests,
    ];

    /// The directive name as written in the header.
    pub fn name(self) -> &'static str {
        match self {
            Directive::DefaultSrc => "default-src",
            Directive::ScriptSrc => "script-src",
            Directive::StyleSrc => "style-src",
            Directive::ImgSrc => "img-src",
            Directive::ConnectSrc => "connect-src",
            Directive::FontSrc => "font-src",
            Directive::ObjectSrc => "object-src",
            Directive::MediaSrc => "media-src",
            Directive::FrameSrc => "frame-src",
            Directive::ChildSrc => "child-src",
            Directive::FormAction => "form-action",
            Directive::FrameAncestors => "frame-ancestors",
            Directive::BaseUri => "base-uri",
            Directive::Sandbox => "sandbox",
            Directive::PluginTypes => "plugin-types",
            Directive::ReportUri => "report-uri",
            Directive::ReportTo => "report-to",
            Directive::WorkerSrc => "worker-src",
            Directive::ManifestSrc => "manifest-src",
            Directive::PrefetchSrc => "prefetch-src",
            Directive::NavigateTo => "navigate-to",
            Directive::BlockAllMixedContent => "block-all-mixed-content",
            Directive::UpgradeInsecureRequests => "upgrade-insecure-requests",
        }
    }

    /// Flag directives are written as a bare name and carry no sources.
    pub fn is_flag(self) -> bool {
        matches!(
            self,
            Directive::BlockAllMixedContent | Directive::UpgradeInsecureRequests
        )
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The value a [`Csp`] holds for one directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveValue<'a> {
    Sources(&'a [String]),
    Flag(bool),
}

/// A Content Security Policy.
///
/// The default value is the empty policy. Build one with struct update syntax
/// and call [`Csp::finalize`] once it is complete:
///
/// ```
/// use web::csp::{Csp, SELF};
///
/// let policy = Csp {
///     default_src: vec![SELF.to_owned()],
///     block_all_mixed_content: true,
///     ..Csp::default()
/// }
/// .finalize();
/// assert_eq!(policy.header(), "block-all-mixed-content; default-src 'self'");
/// ```
///
/// When deserialized, fields use the directive names (`default-src`, ...).
///
/// See <https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Content-Security-Policy>.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Csp {
    pub default_src: Vec<String>,
    pub script_src: Vec<String>,
    pub style_src: Vec<String>,
    pub img_src: Vec<String>,
    pub connect_src: Vec<String>,
    pub font_src: Vec<String>,
    pub object_src: Vec<String>,
    pub media_src: Vec<String>,
    pub frame_src: Vec<String>,
    pub child_src: Vec<String>,
    pub form_action: Vec<String>,
    pub frame_ancestors: Vec<String>,
    pub base_uri: Vec<String>,
    pub sandbox: Vec<String>,
    pub plugin_types: Vec<String>,
    pub report_uri: Vec<String>,
    pub report_to: Vec<String>,
    pub worker_src: Vec<String>,
    pub manifest_src: Vec<String>,
    pub prefetch_src: Vec<String>,
    pub navigate_to: Vec<String>,
    pub block_all_mixed_content: bool,
    pub upgrade_insecure_requests: bool,
}

impl Csp {
    pub fn get(&self, directive: Directive) -> DirectiveValue<'_> {
        let sources = match directive {
            Directive::DefaultSrc => &self.default_src,
            Directive::ScriptSrc => &self.script_src,
            Directive::StyleSrc => &self.style_src,
            Directive::ImgSrc => &self.img_src,
            Directive::ConnectSrc => &self.connect_src,
            Directive::FontSrc => &self.font_src,
            Directive::ObjectSrc => &self.object_src,
            Directive::MediaSrc => &self.media_src,
            Directive::FrameSrc => &self.frame_src,
            Directive::ChildSrc => &self.child_src,
            Directive::FormAction => &self.form_action,
            Directive::FrameAncestors => &self.frame_ancestors,
            Directive::BaseUri => &self.base_uri,
            Directive::Sandbox => &self.sandbox,
            Directive::PluginTypes => &self.plugin_types,
            Directive::ReportUri => &self.report_uri,
            Directive::ReportTo => &self.report_to,
            Directive::WorkerSrc => &self.worker_src,
            Directive::ManifestSrc => &self.manifest_src,
            Directive::PrefetchSrc => &self.prefetch_src,
            Directive::NavigateTo => &self.navigate_to,
            Directive::BlockAllMixedContent => {
                return DirectiveValue::Flag(self.block_all_mixed_content)
            }
            Directive::UpgradeInsecureRequests => {
                return DirectiveValue::Flag(self.upgrade_insecure_requests)
            }
        };
        DirectiveValue::Sources(sources)
    }

    /// Serializes the policy into a header value.
    ///
    /// Directives are sorted, so the output only depends on the policy's
    /// content. An empty policy yields an empty string.
    pub fn header_value(&self) -> String {
        let mut directives: Vec<String> = Directive::ALL
            .iter()
            .filter_map(|&directive| match self.get(directive) {
                DirectiveValue::Sources(sources) if !sources.is_empty() => {
                    Some(format!("{} {}", directive.name(), sources.join(" ")))
                }
                DirectiveValue::Flag(true) => Some(directive.name().to_owned()),
                _ => None,
            })
            .collect();

        directives.sort();
        directives.join("; ")
    }

    /// Computes the header value once and freezes the policy.
    pub fn finalize(self) -> Policy {
        let header = self.header_value();
        Policy(Arc::new(Finalized { csp: self, header }))
    }
}

impl fmt::Display for Csp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.header_value())
    }
}

#[derive(Debug)]
struct Finalized {
    csp: Csp,
    header: String,
}

/// A finalized, immutable [`Csp`] with its header value cached.
///
/// Cloning is cheap; all clones share the cached header.
#[derive(Debug, Clone)]
pub struct Policy(Arc<Finalized>);

impl Policy {
    pub fn header(&self) -> &str {
        &self.0.header
    }

    pub fn csp(&self) -> &Csp {
        &self.0.csp
    }

    pub fn is_empty(&self) -> bool {
        self.0.header.is_empty()
    }
}

impl Default for Policy {
    fn default() -> Self {
        Csp::default().finalize()
    }
}

impl From<Csp> for Policy {
    fn from(csp: Csp) -> Self {
        csp.finalize()
    }
}

impl PartialEq for Policy {
    fn eq(&self, other: &Self) -> bool {
        self.0.header == other.0.header
    }
}

impl Eq for Policy {}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// The restrictive policy served when no route-specific policy matches.
pub fn default_csp() -> Csp {
    Csp {
        default_src: vec![SELF.to_owned()],
        script_src: vec![SELF.to_owned()],
        frame_ancestors: vec![NONE.to_owned()],
        form_action: vec![SELF.to_owned()],
        base_uri: vec![SELF.to_owned()],
        object_src: vec![SELF.to_owned()],
        block_all_mixed_content: true,
        ..Csp::default()
    }
}

pub fn default_policy() -> Policy {
    default_csp().finalize()
}
