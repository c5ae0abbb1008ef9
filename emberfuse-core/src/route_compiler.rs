//! Route template compilation.
//!
//! A template such as `/foo/{bar}/{baz?}` is split into text and variable
//! tokens and turned into an anchored regular expression with one capture
//! group per placeholder. A trailing run of optional placeholders nests so
//! that `/foo/x` and `/foo/x/y` both match the template above.
//!
//! Host templates (`{tenant}.example.com`) compile the same way with `.` as
//! the default separator and case-insensitive matching.

use crate::logging::trace;
use crate::route::Route;
use crate::Error;
use regex::Regex;
use std::collections::HashMap;

/// Characters that may precede a placeholder and act as its separator.
const SEPARATORS: &str = "/,;.:-_~+*=@|";

const MAX_PLACEHOLDER_NAME: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Variable {
        prefix: String,
        name: String,
        requirement: String,
        optional: bool,
    },
}

/// A compiled path or host template.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
    variables: Vec<String>,
    optional: Vec<String>,
    static_prefix: String,
}

impl CompiledPattern {
    /// The full anchored expression.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Placeholder names in declared order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn optional_variables(&self) -> &[String] {
        &self.optional
    }

    /// Literal text before the first placeholder.
    pub fn static_prefix(&self) -> &str {
        &self.static_prefix
    }

    pub fn is_match(&self, subject: &str) -> bool {
        self.regex.is_match(subject)
    }

    /// Capture placeholder values; absent optional segments are `None`.
    pub fn captures(&self, subject: &str) -> Option<Vec<(String, Option<String>)>> {
        let caps = self.regex.captures(subject)?;
        Some(
            self.variables
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let value = caps.name(&group_name(i)).map(|m| m.as_str().to_string());
                    (name.clone(), value)
                })
                .collect(),
        )
    }
}

/// The matchable form of a route.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    path: CompiledPattern,
    host: Option<CompiledPattern>,
    parameter_names: Vec<String>,
    optional_parameters: Vec<String>,
}

impl CompiledRoute {
    pub fn path(&self) -> &CompiledPattern {
        &self.path
    }

    pub fn host(&self) -> Option<&CompiledPattern> {
        self.host.as_ref()
    }

    /// Host placeholders followed by path placeholders.
    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    pub fn optional_parameters(&self) -> &[String] {
        &self.optional_parameters
    }

    pub fn matches_path(&self, path: &str) -> bool {
        self.path.is_match(path)
    }

    /// Always true when the route has no host constraint.
    pub fn matches_host(&self, host: Option<&str>) -> bool {
        match (&self.host, host) {
            (None, _) => true,
            (Some(pattern), Some(host)) => pattern.is_match(host),
            (Some(_), None) => false,
        }
    }
}

/// Compiles [`Route`] templates.
pub struct RouteCompiler;

impl RouteCompiler {
    pub fn compile(route: &Route) -> Result<CompiledRoute, Error> {
        Self::compile_parts(route.uri(), route.host_template(), route.wheres())
    }

    /// Compile a path template and optional host template with per-name
    /// requirements.
    pub fn compile_parts(
        uri: &str,
        host: Option<&str>,
        wheres: &HashMap<String, String>,
    ) -> Result<CompiledRoute, Error> {
        let host = host.map(|h| compile_pattern(h, wheres, true)).transpose()?;
        let path = compile_pattern(uri, wheres, false)?;

        let mut parameter_names: Vec<String> = Vec::new();
        let host_vars = host.iter().flat_map(|h| h.variables.iter());
        for name in host_vars.chain(path.variables.iter()) {
            if parameter_names.contains(name) {
                return Err(invalid(
                    uri,
                    format!("placeholder [{name}] is used in both host and path"),
                ));
            }
            parameter_names.push(name.clone());
        }

        trace!(
            uri,
            regex = path.regex.as_str(),
            parameters = ?parameter_names,
            "Compiled route"
        );

        Ok(CompiledRoute {
            optional_parameters: path.optional.clone(),
            path,
            host,
            parameter_names,
        })
    }
}

fn invalid(template: &str, reason: impl Into<String>) -> Error {
    Error::InvalidRouteTemplate {
        template: template.to_string(),
        reason: reason.into(),
    }
}

fn group_name(index: usize) -> String {
    format!("v{index}")
}

fn is_separator(c: char) -> bool {
    SEPARATORS.contains(c)
}

struct Placeholder {
    start: usize,
    end: usize,
    name: String,
    optional: bool,
}

/// Find every `{name}` / `{name?}` in `template`.
fn scan_placeholders(template: &str) -> Result<Vec<Placeholder>, Error> {
    let mut found = Vec::new();
    let mut open: Option<usize> = None;

    for (i, c) in template.char_indices() {
        match c {
            '{' if open.is_some() => return Err(invalid(template, "nested `{`")),
            '{' => open = Some(i),
            '}' => {
                let start = open
                    .take()
                    .ok_or_else(|| invalid(template, "unmatched `}`"))?;
                let inner = &template[start + 1..i];
                let (name, optional) = match inner.strip_suffix('?') {
                    Some(name) => (name, true),
                    None => (inner, false),
                };

                if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return Err(invalid(template, format!("malformed placeholder `{{{inner}}}`")));
                }
                if name.len() > MAX_PLACEHOLDER_NAME {
                    return Err(invalid(template, format!("placeholder name [{name}] is too long")));
                }

                found.push(Placeholder {
                    start,
                    end: i + 1,
                    name: name.to_string(),
                    optional,
                });
            }
            _ => {}
        }
    }

    if open.is_some() {
        return Err(invalid(template, "unclosed `{`"));
    }

    Ok(found)
}

/// First separator character of `following`, ignoring placeholders.
fn next_separator(following: &str) -> Option<char> {
    let mut depth = 0usize;
    for c in following.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 => return is_separator(c).then_some(c),
            _ => {}
        }
    }
    None
}

fn tokenize(
    template: &str,
    wheres: &HashMap<String, String>,
    is_host: bool,
) -> Result<Vec<Token>, Error> {
    let default_separator = if is_host { '.' } else { '/' };
    let placeholders = scan_placeholders(template)?;

    let mut tokens = Vec::new();
    let mut names: Vec<&str> = Vec::new();
    let mut pos = 0;

    for placeholder in &placeholders {
        if names.contains(&placeholder.name.as_str()) {
            return Err(invalid(
                template,
                format!("placeholder [{}] appears more than once", placeholder.name),
            ));
        }
        names.push(&placeholder.name);

        if is_host && placeholder.optional {
            return Err(invalid(template, "optional placeholders are not allowed in a host"));
        }

        let preceding = &template[pos..placeholder.start];
        let prefix = match preceding.chars().last() {
            Some(c) if is_separator(c) => {
                let text = &preceding[..preceding.len() - c.len_utf8()];
                if !text.is_empty() {
                    tokens.push(Token::Text(text.to_string()));
                }
                c.to_string()
            }
            _ => {
                if !preceding.is_empty() {
                    tokens.push(Token::Text(preceding.to_string()));
                }
                String::new()
            }
        };

        let requirement = match wheres.get(&placeholder.name) {
            Some(requirement) => sanitize_requirement(requirement),
            None => {
                let mut excluded = regex::escape(&default_separator.to_string());
                if let Some(next) = next_separator(&template[placeholder.end..]) {
                    if next != default_separator {
                        excluded.push_str(&regex::escape(&next.to_string()));
                    }
                }
                format!("[^{excluded}]+")
            }
        };

        tokens.push(Token::Variable {
            prefix,
            name: placeholder.name.clone(),
            requirement,
            optional: placeholder.optional,
        });
        pos = placeholder.end;
    }

    if pos < template.len() {
        tokens.push(Token::Text(template[pos..].to_string()));
    }

    Ok(tokens)
}

/// Requirements are embedded in a larger expression; strip anchors.
fn sanitize_requirement(requirement: &str) -> String {
    let trimmed = requirement.strip_prefix('^').unwrap_or(requirement);
    let trimmed = match trimmed.strip_suffix('$') {
        Some(rest) if !rest.ends_with('\\') => rest,
        _ => trimmed,
    };
    trimmed.to_string()
}

/// Index of the first token of the trailing optional run, or `tokens.len()`.
fn first_optional(template: &str, tokens: &[Token]) -> Result<usize, Error> {
    let mut first = tokens.len();
    for (i, token) in tokens.iter().enumerate().rev() {
        match token {
            Token::Variable { optional: true, .. } => first = i,
            _ => break,
        }
    }

    if let Some(Token::Variable { name, .. }) = tokens[..first]
        .iter()
        .find(|t| matches!(t, Token::Variable { optional: true, .. }))
    {
        return Err(invalid(
            template,
            format!("optional placeholder [{name}] must not be followed by required segments"),
        ));
    }

    Ok(first)
}

fn token_regex(tokens: &[Token], index: usize, first_optional: usize) -> String {
    match &tokens[index] {
        Token::Text(text) => regex::escape(text),
        Token::Variable {
            prefix,
            requirement,
            ..
        } => {
            let group = group_name(variable_index(tokens, index));
            if index == 0 && first_optional == 0 {
                // a lone optional variable keeps its separator mandatory
                return format!("{}(?P<{group}>{requirement})?", regex::escape(prefix));
            }

            let mut expr = format!("{}(?P<{group}>{requirement})", regex::escape(prefix));
            if index >= first_optional {
                expr = format!("(?:{expr}");
                if index == tokens.len() - 1 {
                    let closing =
                        tokens.len() - first_optional - usize::from(first_optional == 0);
                    expr.push_str(&")?".repeat(closing));
                }
            }
            expr
        }
    }
}

/// Position of token `index` among the variable tokens.
fn variable_index(tokens: &[Token], index: usize) -> usize {
    tokens[..index]
        .iter()
        .filter(|t| matches!(t, Token::Variable { .. }))
        .count()
}

fn compile_pattern(
    template: &str,
    wheres: &HashMap<String, String>,
    is_host: bool,
) -> Result<CompiledPattern, Error> {
    let tokens = tokenize(template, wheres, is_host)?;
    let first_optional = first_optional(template, &tokens)?;

    let body: String = (0..tokens.len())
        .map(|i| token_regex(&tokens, i, first_optional))
        .collect();
    let flags = if is_host { "(?i)" } else { "(?s)" };
    let source = format!("{flags}^{body}$");

    let regex = Regex::new(&source)
        .map_err(|e| invalid(template, format!("invalid requirement: {e}")))?;

    let mut variables = Vec::new();
    let mut optional = Vec::new();
    for token in &tokens {
        if let Token::Variable {
            name,
            optional: is_optional,
            ..
        } = token
        {
            variables.push(name.clone());
            if *is_optional {
                optional.push(name.clone());
            }
        }
    }

    let static_prefix = match tokens.first() {
        Some(Token::Text(text)) => text.clone(),
        _ => String::new(),
    };

    Ok(CompiledPattern {
        regex,
        variables,
        optional,
        static_prefix,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(uri: &str) -> CompiledRoute {
        RouteCompiler::compile_parts(uri, None, &HashMap::new()).unwrap()
    }

    #[test]
    fn test_static_route() {
        let route = compile("/foo/bar");
        assert_eq!(route.path().regex().as_str(), "(?s)^/foo/bar$");
        assert!(route.matches_path("/foo/bar"));
        assert!(!route.matches_path("/foo/bar/baz"));
        assert!(route.parameter_names().is_empty());
    }

    #[test]
    fn test_trailing_optional_parameter() {
        let route = compile("/foo/{bar}/{baz?}");

        assert_eq!(route.parameter_names(), &["bar", "baz"]);
        assert_eq!(route.optional_parameters(), &["baz"]);
        assert!(route.matches_path("/foo/x"));
        assert!(route.matches_path("/foo/x/y"));
        assert!(!route.matches_path("/foo"));

        let caps = route.path().captures("/foo/x").unwrap();
        assert_eq!(caps[0], ("bar".to_string(), Some("x".to_string())));
        assert_eq!(caps[1], ("baz".to_string(), None));
    }

    #[test]
    fn test_lone_optional_parameter() {
        let route = compile("/{baz?}");
        assert!(route.matches_path("/"));
        assert!(route.matches_path("/30"));
        assert!(!route.matches_path("/30/40"));
    }

    #[test]
    fn test_all_optional_parameters() {
        let route = compile("/{foo?}/{baz?}");
        assert_eq!(
            route.path().regex().as_str(),
            "(?s)^/(?P<v0>[^/]+)?(?:/(?P<v1>[^/]+))?$"
        );
        assert!(route.matches_path("/"));
        assert!(route.matches_path("/navin"));
        assert!(route.matches_path("/navin/30"));
    }

    #[test]
    fn test_next_separator_is_excluded() {
        let route = compile("/files/{name}.{ext}");
        let caps = route.path().captures("/files/report.pdf").unwrap();
        assert_eq!(caps[0].1.as_deref(), Some("report"));
        assert_eq!(caps[1].1.as_deref(), Some("pdf"));
    }

    #[test]
    fn test_requirements() {
        let mut wheres = HashMap::new();
        wheres.insert("id".to_string(), "^\\d+$".to_string());
        let route = RouteCompiler::compile_parts("/users/{id}", None, &wheres).unwrap();

        assert!(route.matches_path("/users/42"));
        assert!(!route.matches_path("/users/abc"));
    }

    #[test]
    fn test_requirement_with_groups_keeps_mapping() {
        let mut wheres = HashMap::new();
        wheres.insert("slug".to_string(), "(a|b)+".to_string());
        let route = RouteCompiler::compile_parts("/{slug}/{page}", None, &wheres).unwrap();

        let caps = route.path().captures("/abab/3").unwrap();
        assert_eq!(caps[0].1.as_deref(), Some("abab"));
        assert_eq!(caps[1].1.as_deref(), Some("3"));
    }

    #[test]
    fn test_host_template() {
        let route =
            RouteCompiler::compile_parts("/", Some("{tenant}.example.com"), &HashMap::new())
                .unwrap();

        assert!(route.matches_host(Some("acme.example.com")));
        assert!(route.matches_host(Some("ACME.Example.com")));
        assert!(!route.matches_host(Some("example.org")));
        assert!(!route.matches_host(None));
        assert_eq!(route.parameter_names(), &["tenant"]);
    }

    #[test]
    fn test_no_host_always_matches() {
        assert!(compile("/").matches_host(None));
        assert!(compile("/").matches_host(Some("anything")));
    }

    #[test]
    fn test_non_trailing_optional_rejected() {
        let err = RouteCompiler::compile_parts("/{a?}/{b}", None, &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidRouteTemplate { .. }));

        let err = RouteCompiler::compile_parts("/{a?}/static", None, &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidRouteTemplate { .. }));
    }

    #[test]
    fn test_malformed_templates_rejected() {
        for template in ["/{a}/{a}", "/{a", "/a}", "/{}", "/{a-b}", "/{{a}}"] {
            let result = RouteCompiler::compile_parts(template, None, &HashMap::new());
            assert!(
                matches!(result, Err(Error::InvalidRouteTemplate { .. })),
                "{template} should be rejected"
            );
        }
    }

    #[test]
    fn test_invalid_requirement_rejected() {
        let mut wheres = HashMap::new();
        wheres.insert("id".to_string(), "(".to_string());
        let result = RouteCompiler::compile_parts("/{id}", None, &wheres);
        assert!(matches!(result, Err(Error::InvalidRouteTemplate { .. })));
    }

    #[test]
    fn test_unicode_literal_segment() {
        let route = compile("/foo/bar/åαф");
        assert!(route.matches_path("/foo/bar/åαф"));
        assert_eq!(route.path().static_prefix(), "/foo/bar/åαф");
    }
}
