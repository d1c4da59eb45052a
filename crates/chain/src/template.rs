//! Prompt templates with `{variable}` placeholders.
//!
//! Templates are parsed once at construction. `{{` and `}}` stand for
//! literal braces. Rendering substitutes values verbatim in a single pass,
//! so a value containing `{x}` is never expanded again.

use crate::Variables;
use promptchain_core::ChainError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A named template string plus the variables it needs.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    name: String,
    template: String,
    input_variables: Vec<String>,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Create a template with an explicit list of required variables.
    ///
    /// Fails with [`ChainError::InvalidTemplate`] if the template is
    /// malformed or uses a placeholder missing from `input_variables`.
    pub fn new<I, S>(
        name: impl Into<String>,
        input_variables: I,
        template: impl Into<String>,
    ) -> Result<Self, ChainError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let template = template.into();
        let segments = parse(&name, &template)?;

        let mut declared: Vec<String> = Vec::new();
        for var in input_variables {
            let var = var.into();
            if !declared.contains(&var) {
                declared.push(var);
            }
        }

        for segment in &segments {
            if let Segment::Variable(var) = segment {
                if !declared.contains(var) {
                    return Err(ChainError::InvalidTemplate {
                        template: name,
                        reason: format!("placeholder '{{{var}}}' is not a declared input variable"),
                    });
                }
            }
        }

        Ok(Self {
            name,
            template,
            input_variables: declared,
            segments,
        })
    }

    /// Create a template whose variables are its placeholders, in order of
    /// first appearance.
    pub fn from_template(
        name: impl Into<String>,
        template: impl Into<String>,
    ) -> Result<Self, ChainError> {
        let name = name.into();
        let template = template.into();
        let segments = parse(&name, &template)?;

        let mut input_variables: Vec<String> = Vec::new();
        for segment in &segments {
            if let Segment::Variable(var) = segment {
                if !input_variables.contains(var) {
                    input_variables.push(var.clone());
                }
            }
        }

        Ok(Self {
            name,
            template,
            input_variables,
            segments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Variables that must be supplied to render.
    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    /// Render against a variable mapping.
    pub fn render(&self, vars: &Variables) -> Result<String, ChainError> {
        self.render_with(|name| vars.get(name).map(String::as_str))
    }

    /// Render with an arbitrary lookup. Every required variable is checked
    /// before anything is substituted.
    pub fn render_with<'a, F>(&self, lookup: F) -> Result<String, ChainError>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        if let Some(missing) = self.input_variables.iter().find(|v| lookup(v).is_none()) {
            return Err(ChainError::MissingVariable {
                template: self.name.clone(),
                name: missing.clone(),
            });
        }

        let mut out = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                // Checked above
                Segment::Variable(var) => out.push_str(lookup(var).unwrap_or_default()),
            }
        }
        Ok(out)
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> ChainError {
    ChainError::InvalidTemplate {
        template: name.to_string(),
        reason: reason.into(),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn parse(name: &str, template: &str) -> Result<Vec<Segment>, ChainError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '{' => {
                let mut var = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => var.push(ch),
                        None => return Err(invalid(name, "unclosed '{'")),
                    }
                }
                if !is_identifier(&var) {
                    return Err(invalid(name, format!("'{{{var}}}' is not a valid placeholder")));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Variable(var));
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(invalid(name, "single '}' without matching '{'")),
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn renders_single_placeholder() {
        let t = PromptTemplate::new("person", ["name"], "Tell me about celebrity {name}").unwrap();
        let out = t.render(&vars(&[("name", "Isaac Newton")])).unwrap();
        assert_eq!(out, "Tell me about celebrity Isaac Newton");
    }

    #[test]
    fn render_is_idempotent() {
        let t = PromptTemplate::from_template("dob", "When was {person} born?").unwrap();
        let v = vars(&[("person", "Ada Lovelace")]);
        assert_eq!(t.render(&v).unwrap(), t.render(&v).unwrap());
    }

    #[test]
    fn missing_variable_fails_without_partial_output() {
        let t = PromptTemplate::from_template("pair", "{a} and {b}").unwrap();
        let err = t.render(&vars(&[("a", "x")])).unwrap_err();
        match err {
            ChainError::MissingVariable { template, name } => {
                assert_eq!(template, "pair");
                assert_eq!(name, "b");
            }
            other => panic!("Expected MissingVariable, got {other:?}"),
        }
    }

    #[test]
    fn declared_but_unused_variable_is_still_required() {
        let t = PromptTemplate::new("t", ["name", "extra"], "Hi {name}").unwrap();
        assert!(matches!(
            t.render(&vars(&[("name", "x")])),
            Err(ChainError::MissingVariable { name, .. }) if name == "extra"
        ));
    }

    #[test]
    fn values_are_not_expanded_again() {
        let t = PromptTemplate::from_template("t", "Q: {q}").unwrap();
        let out = t.render(&vars(&[("q", "{q} {other}")])).unwrap();
        assert_eq!(out, "Q: {q} {other}");
    }

    #[test]
    fn double_braces_are_literal() {
        let t = PromptTemplate::from_template("json", "Return {{\"year\": {dob}}}").unwrap();
        assert_eq!(t.input_variables(), &["dob".to_string()]);
        let out = t.render(&vars(&[("dob", "1642")])).unwrap();
        assert_eq!(out, "Return {\"year\": 1642}");
    }

    #[test]
    fn repeated_placeholder_is_one_variable() {
        let t = PromptTemplate::from_template("t", "{x}, {y}, {x}").unwrap();
        assert_eq!(t.input_variables(), &["x".to_string(), "y".to_string()]);
        assert_eq!(t.render(&vars(&[("x", "1"), ("y", "2")])).unwrap(), "1, 2, 1");
    }

    #[test]
    fn undeclared_placeholder_is_rejected() {
        let err = PromptTemplate::new("t", ["name"], "{name} {person}").unwrap_err();
        assert!(matches!(err, ChainError::InvalidTemplate { .. }));
        assert!(err.to_string().contains("person"));
    }

    #[test]
    fn malformed_templates_are_rejected() {
        for bad in ["{name", "name}", "{}", "{1st}", "{a b}", "{a{b}}"] {
            assert!(
                matches!(PromptTemplate::from_template("t", bad), Err(ChainError::InvalidTemplate { .. })),
                "{bad} should be invalid"
            );
        }
    }

    #[test]
    fn template_without_placeholders_renders_verbatim() {
        let t = PromptTemplate::from_template("static", "Say hello.").unwrap();
        assert!(t.input_variables().is_empty());
        assert_eq!(t.render(&Variables::new()).unwrap(), "Say hello.");
    }

    #[test]
    fn render_with_custom_lookup() {
        let t = PromptTemplate::from_template("t", "{history}Q: {q}").unwrap();
        let history = String::from("Human: a\nAI: b\n");
        let out = t
            .render_with(|k| match k {
                "history" => Some(history.as_str()),
                "q" => Some("c"),
                _ => None,
            })
            .unwrap();
        assert_eq!(out, "Human: a\nAI: b\nQ: c");
    }
}
