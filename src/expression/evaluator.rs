// ABOUTME: Evaluator for ${{ context.property }} expressions
// ABOUTME: Resolves single lookups and substitutes every occurrence inside a string

use super::context::{EnvContext, GitHubContext, RunnerContext};
use super::error::{ExpressionError, Result};

const OPEN: &str = "${{";
const CLOSE: &str = "}}";

/// Result of substituting expressions in a string.
///
/// When `error` is set, `value` holds the text resolved up to the failing
/// expression followed by the untouched remainder of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substituted {
    pub value: String,
    pub error: Option<ExpressionError>,
}

pub struct ExpressionEvaluator<'a> {
    github: &'a GitHubContext,
    runner: &'a RunnerContext,
    env: &'a EnvContext,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(github: &'a GitHubContext, runner: &'a RunnerContext, env: &'a EnvContext) -> Self {
        Self {
            github,
            runner,
            env,
        }
    }

    /// Evaluate a single token. Anything that is not a `${{ ... }}` token is
    /// returned unchanged.
    pub fn evaluate(&self, token: &str) -> Result<String> {
        let trimmed = token.trim();
        match trimmed
            .strip_prefix(OPEN)
            .and_then(|rest| rest.strip_suffix(CLOSE))
        {
            Some(inner) => self.lookup(inner.trim()),
            None => Ok(token.to_string()),
        }
    }

    /// Replace every expression in `input`, stopping at the first failure.
    pub fn substitute(&self, input: &str) -> Substituted {
        let mut value = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find(OPEN) {
            let after_open = &rest[start + OPEN.len()..];
            let Some(end) = after_open.find(CLOSE) else {
                break;
            };

            value.push_str(&rest[..start]);
            match self.lookup(after_open[..end].trim()) {
                Ok(resolved) => {
                    value.push_str(&resolved);
                    rest = &after_open[end + CLOSE.len()..];
                }
                Err(error) => {
                    value.push_str(&rest[start..]);
                    return Substituted {
                        value,
                        error: Some(error),
                    };
                }
            }
        }

        value.push_str(rest);
        Substituted { value, error: None }
    }

    fn lookup(&self, expression: &str) -> Result<String> {
        let parts: Vec<&str> = expression.split('.').map(str::trim).collect();
        let [context, property] = parts.as_slice() else {
            return Err(ExpressionError::Unsupported {
                expression: expression.to_string(),
            });
        };

        if context.is_empty() || property.is_empty() {
            return Err(ExpressionError::Unsupported {
                expression: expression.to_string(),
            });
        }

        let context = context.to_lowercase();
        let found = match context.as_str() {
            "github" => self.github.property(property),
            "runner" => self.runner.property(property),
            "env" => {
                return self
                    .env
                    .get(property)
                    .map(str::to_string)
                    .ok_or_else(|| ExpressionError::MissingVariable {
                        name: property.to_string(),
                    })
            }
            _ => return Err(ExpressionError::UnknownContext { context }),
        };

        found
            .map(str::to_string)
            .ok_or_else(|| ExpressionError::UnknownProperty {
                context,
                property: property.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn contexts() -> (GitHubContext, RunnerContext, EnvContext) {
        let mut github = GitHubContext::local("octo/widgets", "/workspace");
        github.sha = "abc123".to_string();
        let mut vars = BTreeMap::new();
        vars.insert("FOO".to_string(), "bar".to_string());
        (github, RunnerContext::default(), EnvContext::new(vars))
    }

    #[test]
    fn test_evaluate_known_contexts() {
        let (github, runner, env) = contexts();
        let evaluator = ExpressionEvaluator::new(&github, &runner, &env);

        assert_eq!(evaluator.evaluate("${{ github.sha }}").unwrap(), "abc123");
        assert_eq!(evaluator.evaluate("${{env.FOO}}").unwrap(), "bar");
        assert_eq!(evaluator.evaluate("${{ Runner.os }}").unwrap(), "Linux");
    }

    #[test]
    fn test_plain_text_is_returned_unchanged() {
        let (github, runner, env) = contexts();
        let evaluator = ExpressionEvaluator::new(&github, &runner, &env);

        assert_eq!(evaluator.evaluate("hello").unwrap(), "hello");
    }

    #[test]
    fn test_evaluate_errors() {
        let (github, runner, env) = contexts();
        let evaluator = ExpressionEvaluator::new(&github, &runner, &env);

        assert_eq!(
            evaluator.evaluate("${{ bogus.x }}"),
            Err(ExpressionError::UnknownContext {
                context: "bogus".to_string()
            })
        );
        assert_eq!(
            evaluator.evaluate("${{ env.MISSING }}"),
            Err(ExpressionError::MissingVariable {
                name: "MISSING".to_string()
            })
        );
        assert!(matches!(
            evaluator.evaluate("${{ github.event.head_commit }}"),
            Err(ExpressionError::Unsupported { .. })
        ));
        assert!(matches!(
            evaluator.evaluate("${{ github.token }}"),
            Err(ExpressionError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_substitute_all_occurrences() {
        let (github, runner, env) = contexts();
        let evaluator = ExpressionEvaluator::new(&github, &runner, &env);

        let result = evaluator.substitute("repo=${{ github.repository }} foo=${{ env.FOO }}!");
        assert_eq!(result.value, "repo=octo/widgets foo=bar!");
        assert_eq!(result.error, None);
    }

    #[test]
    fn test_substitute_stops_at_first_error() {
        let (github, runner, env) = contexts();
        let evaluator = ExpressionEvaluator::new(&github, &runner, &env);

        let result =
            evaluator.substitute("a=${{ env.FOO }} b=${{ env.NOPE }} c=${{ github.sha }}");
        assert_eq!(result.value, "a=bar b=${{ env.NOPE }} c=${{ github.sha }}");
        assert!(matches!(
            result.error,
            Some(ExpressionError::MissingVariable { .. })
        ));
    }

    #[test]
    fn test_substitute_does_not_rescan_inserted_text() {
        let (github, runner, _) = contexts();
        let mut vars = BTreeMap::new();
        vars.insert("NESTED".to_string(), "${{ github.sha }}".to_string());
        let env = EnvContext::new(vars);
        let evaluator = ExpressionEvaluator::new(&github, &runner, &env);

        let result = evaluator.substitute("${{ env.NESTED }}");
        assert_eq!(result.value, "${{ github.sha }}");
        assert_eq!(result.error, None);
    }

    #[test]
    fn test_unterminated_expression_is_left_alone() {
        let (github, runner, env) = contexts();
        let evaluator = ExpressionEvaluator::new(&github, &runner, &env);

        let result = evaluator.substitute("x ${{ github.sha ");
        assert_eq!(result.value, "x ${{ github.sha ");
        assert_eq!(result.error, None);
    }
}
