//! Query construction for name/address searches.
//!
//! A search takes an optional name and an optional address and turns
//! them into a single `QueryExpr`:
//! - Permutation mode matches a multi-word name in any word order
//!   (one phrase clause per distinct ordering, OR-ed together) and a
//!   multi-word address as an exact phrase.
//! - Fuzzy mode appends an edit distance to every word and joins the
//!   words with AND (two or more words) or OR (a single word).
//! - Name and address clauses are AND-ed when both are present.

use std::collections::HashSet;

use serde_json::{json, Value};
use thiserror::Error;

use crate::models::{
    MatchMode, QueryExpr, SearchRequest, DEFAULT_ADDRESS_FIELD, DEFAULT_FUZZINESS,
    DEFAULT_MAX_PERMUTED_WORDS, DEFAULT_NAME_FIELD,
};

/// Field names and tuning knobs used while building queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub name_field: String,
    pub address_field: String,
    /// Edit distance appended to each word in fuzzy mode.
    pub fuzziness: u8,
    /// Upper bound on the number of name words expanded into
    /// permutations.
    pub max_permuted_words: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            name_field: DEFAULT_NAME_FIELD.to_string(),
            address_field: DEFAULT_ADDRESS_FIELD.to_string(),
            fuzziness: DEFAULT_FUZZINESS,
            max_permuted_words: DEFAULT_MAX_PERMUTED_WORDS,
        }
    }
}

/// Reasons a request cannot be turned into a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error(
        "name has {words} words; permutation search supports at most {max} \
         (try fuzzy mode or fewer words)"
    )]
    TooManyWords { words: usize, max: usize },
}

/// Build the combined query for a request.
///
/// Returns `Ok(None)` when neither a name nor an address was given;
/// callers must not contact the engine in that case.
pub fn build_query(
    request: &SearchRequest,
    options: &QueryOptions,
) -> Result<Option<QueryExpr>, QueryError> {
    let mut clauses = Vec::with_capacity(2);

    if let Some(name) = non_empty(request.name.as_deref()) {
        clauses.push(name_clause(name, request.mode, options)?);
    }

    if let Some(address) = non_empty(request.address.as_deref()) {
        clauses.push(address_clause(address, request.mode, options));
    }

    Ok(match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(QueryExpr::AllOf(clauses)),
    })
}

/// Clause matching the name field.
pub fn name_clause(
    name: &str,
    mode: MatchMode,
    options: &QueryOptions,
) -> Result<QueryExpr, QueryError> {
    let name = name.trim();
    let words: Vec<&str> = name.split_whitespace().collect();

    match mode {
        MatchMode::Fuzzy => Ok(QueryExpr::QueryString {
            field: options.name_field.clone(),
            query: fuzzy_query_string(&words, options.fuzziness),
        }),
        MatchMode::Permutation if words.len() > 1 => {
            if words.len() > options.max_permuted_words {
                return Err(QueryError::TooManyWords {
                    words: words.len(),
                    max: options.max_permuted_words,
                });
            }

            let alternatives = distinct_permutations(&words)
                .into_iter()
                .map(|variant| QueryExpr::MatchPhrase {
                    field: options.name_field.clone(),
                    text: variant,
                })
                .collect();
            Ok(QueryExpr::AnyOf(alternatives))
        }
        MatchMode::Permutation => Ok(QueryExpr::Match {
            field: options.name_field.clone(),
            text: name.to_string(),
        }),
    }
}

/// Clause matching the address field.
pub fn address_clause(address: &str, mode: MatchMode, options: &QueryOptions) -> QueryExpr {
    let address = address.trim();

    match mode {
        MatchMode::Fuzzy => {
            let words: Vec<&str> = address.split_whitespace().collect();
            QueryExpr::QueryString {
                field: options.address_field.clone(),
                query: fuzzy_query_string(&words, options.fuzziness),
            }
        }
        MatchMode::Permutation if address.contains(char::is_whitespace) => {
            QueryExpr::MatchPhrase {
                field: options.address_field.clone(),
                text: address.to_string(),
            }
        }
        MatchMode::Permutation => QueryExpr::Match {
            field: options.address_field.clone(),
            text: address.to_string(),
        },
    }
}

/// Every distinct ordering of `words`, each joined with single
/// spaces.
///
/// Orderings are produced in index order starting with the input
/// order; repeated words collapse duplicate orderings, keeping the
/// first occurrence.
pub fn distinct_permutations(words: &[&str]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut used = vec![false; words.len()];
    let mut current = Vec::with_capacity(words.len());

    permute(words, &mut used, &mut current, &mut seen, &mut out);
    out
}

fn permute<'a>(
    words: &[&'a str],
    used: &mut [bool],
    current: &mut Vec<&'a str>,
    seen: &mut HashSet<String>,
    out: &mut Vec<String>,
) {
    if current.len() == words.len() {
        let joined = current.join(" ");
        if seen.insert(joined.clone()) {
            out.push(joined);
        }
        return;
    }

    for i in 0..words.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        current.push(words[i]);
        permute(words, used, current, seen, out);
        current.pop();
        used[i] = false;
    }
}

/// Append `~fuzziness` to every word and join with ` AND ` when there
/// are two or more words, ` OR ` otherwise.
///
/// The AND/OR split is a word-count heuristic, not a tuned relevance
/// policy.
pub fn fuzzy_query_string(words: &[&str], fuzziness: u8) -> String {
    let operator = if words.len() >= 2 { " AND " } else { " OR " };
    words
        .iter()
        .map(|word| format!("{word}~{fuzziness}"))
        .collect::<Vec<_>>()
        .join(operator)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl QueryExpr {
    /// Render as the JSON query DSL shared by Elasticsearch and
    /// Manticore.
    pub fn to_dsl(&self) -> Value {
        match self {
            QueryExpr::Match { field, text } => json!({"match": {field.as_str(): text}}),
            QueryExpr::MatchPhrase { field, text } => {
                json!({"match_phrase": {field.as_str(): text}})
            }
            QueryExpr::QueryString { field, query } => json!({
                "query_string": {"query": query, "default_field": field}
            }),
            QueryExpr::AnyOf(clauses) => json!({
                "bool": {
                    "should": clauses.iter().map(QueryExpr::to_dsl).collect::<Vec<_>>(),
                    "minimum_should_match": 1
                }
            }),
            QueryExpr::AllOf(clauses) => json!({
                "bool": {"must": clauses.iter().map(QueryExpr::to_dsl).collect::<Vec<_>>()}
            }),
        }
    }

    /// Whether the expression contains any `query_string` clauses.
    pub fn uses_query_string(&self) -> bool {
        match self {
            QueryExpr::QueryString { .. } => true,
            QueryExpr::Match { .. } | QueryExpr::MatchPhrase { .. } => false,
            QueryExpr::AnyOf(clauses) | QueryExpr::AllOf(clauses) => {
                clauses.iter().any(QueryExpr::uses_query_string)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, address: &str, mode: MatchMode) -> SearchRequest {
        SearchRequest {
            name: Some(name.to_string()),
            address: Some(address.to_string()),
            mode,
            limit: None,
        }
    }

    fn build(name: &str, address: &str) -> Option<QueryExpr> {
        build_query(
            &request(name, address, MatchMode::Permutation),
            &QueryOptions::default(),
        )
        .expect("query")
    }

    #[test]
    fn two_word_name_matches_both_orders() {
        let query = build("JOHN DOE", "").expect("query");

        assert_eq!(
            query.to_dsl(),
            json!({
                "bool": {
                    "should": [
                        {"match_phrase": {"debtor_name": "JOHN DOE"}},
                        {"match_phrase": {"debtor_name": "DOE JOHN"}}
                    ],
                    "minimum_should_match": 1
                }
            })
        );
    }

    #[test]
    fn multi_word_address_alone_is_a_phrase() {
        let query = build("", "123 MAIN ST").expect("query");
        assert_eq!(
            query.to_dsl(),
            json!({"match_phrase": {"debtor_address": "123 MAIN ST"}})
        );
    }

    #[test]
    fn single_words_on_both_fields_are_and_ed_matches() {
        let query = build("JOHN", "DALLAS").expect("query");
        assert_eq!(
            query.to_dsl(),
            json!({
                "bool": {"must": [
                    {"match": {"debtor_name": "JOHN"}},
                    {"match": {"debtor_address": "DALLAS"}}
                ]}
            })
        );
    }

    #[test]
    fn empty_inputs_produce_no_query() {
        assert_eq!(build("", ""), None);
        assert_eq!(build("   ", "\t"), None);
        assert_eq!(
            build_query(&SearchRequest::default(), &QueryOptions::default()).expect("ok"),
            None
        );
    }

    #[test]
    fn single_clause_is_used_directly() {
        let query = build("JOHN", "").expect("query");
        assert_eq!(
            query,
            QueryExpr::Match {
                field: "debtor_name".to_string(),
                text: "JOHN".to_string(),
            }
        );
    }

    #[test]
    fn both_clauses_combine_into_exactly_two_musts() {
        let query = build("JOHN QUINCY DOE", "123 MAIN ST").expect("query");
        match query {
            QueryExpr::AllOf(clauses) => {
                assert_eq!(clauses.len(), 2);
                assert!(matches!(clauses[0], QueryExpr::AnyOf(_)));
                assert!(matches!(clauses[1], QueryExpr::MatchPhrase { .. }));
            }
            other => panic!("expected AllOf, got {other:?}"),
        }
    }

    #[test]
    fn permutation_count_is_factorial_of_distinct_words() {
        let factorial = |k: usize| (1..=k).product::<usize>();
        for words in [
            vec!["A", "B"],
            vec!["A", "B", "C"],
            vec!["A", "B", "C", "D"],
            vec!["A", "B", "C", "D", "E"],
        ] {
            let perms = distinct_permutations(&words);
            assert_eq!(perms.len(), factorial(words.len()));
            let unique: HashSet<&String> = perms.iter().collect();
            assert_eq!(unique.len(), perms.len());
        }
    }

    #[test]
    fn repeated_words_collapse_duplicate_orderings() {
        let perms = distinct_permutations(&["JOHN", "JOHN", "DOE"]);
        assert_eq!(
            perms,
            vec![
                "JOHN JOHN DOE".to_string(),
                "JOHN DOE JOHN".to_string(),
                "DOE JOHN JOHN".to_string(),
            ]
        );

        assert_eq!(distinct_permutations(&["A", "A"]), vec!["A A".to_string()]);
    }

    #[test]
    fn first_permutation_is_input_order() {
        let perms = distinct_permutations(&["MARY", "ANN", "SMITH"]);
        assert_eq!(perms[0], "MARY ANN SMITH");
        assert_eq!(perms.len(), 6);
    }

    #[test]
    fn single_word_name_never_produces_permutations() {
        for name in ["JOHN", "  JOHN  "] {
            let clause =
                name_clause(name, MatchMode::Permutation, &QueryOptions::default()).expect("ok");
            assert_eq!(
                clause,
                QueryExpr::Match {
                    field: "debtor_name".to_string(),
                    text: "JOHN".to_string(),
                }
            );
        }
    }

    #[test]
    fn name_words_are_normalized_to_single_spaces() {
        let clause = name_clause("JOHN    DOE", MatchMode::Permutation, &QueryOptions::default())
            .expect("ok");
        let QueryExpr::AnyOf(alternatives) = clause else {
            panic!("expected AnyOf");
        };
        assert_eq!(
            alternatives[0],
            QueryExpr::MatchPhrase {
                field: "debtor_name".to_string(),
                text: "JOHN DOE".to_string(),
            }
        );
    }

    #[test]
    fn too_many_name_words_are_rejected() {
        let options = QueryOptions {
            max_permuted_words: 3,
            ..QueryOptions::default()
        };
        let err = name_clause("A B C D", MatchMode::Permutation, &options).expect_err("error");
        assert_eq!(err, QueryError::TooManyWords { words: 4, max: 3 });

        // Fuzzy mode does not expand permutations.
        assert!(name_clause("A B C D", MatchMode::Fuzzy, &options).is_ok());
    }

    #[test]
    fn address_uses_phrase_only_when_it_has_whitespace() {
        let options = QueryOptions::default();
        assert!(matches!(
            address_clause("123 MAIN", MatchMode::Permutation, &options),
            QueryExpr::MatchPhrase { .. }
        ));
        assert!(matches!(
            address_clause("  DALLAS ", MatchMode::Permutation, &options),
            QueryExpr::Match { .. }
        ));
        assert!(matches!(
            address_clause("123\tMAIN", MatchMode::Permutation, &options),
            QueryExpr::MatchPhrase { .. }
        ));
    }

    #[test]
    fn fuzzy_mode_joins_multiple_words_with_and() {
        let query = build_query(
            &request("JOHN DOE", "", MatchMode::Fuzzy),
            &QueryOptions::default(),
        )
        .expect("ok")
        .expect("query");

        assert_eq!(
            query.to_dsl(),
            json!({"query_string": {"query": "JOHN~2 AND DOE~2", "default_field": "debtor_name"}})
        );
    }

    #[test]
    fn fuzzy_mode_single_word_uses_or_policy() {
        assert_eq!(fuzzy_query_string(&["DALLAS"], 2), "DALLAS~2");
        assert_eq!(fuzzy_query_string(&["MAIN", "ST"], 1), "MAIN~1 AND ST~1");
    }

    #[test]
    fn fuzzy_address_uses_the_same_policy() {
        let clause = address_clause("123 MAIN ST", MatchMode::Fuzzy, &QueryOptions::default());
        assert_eq!(
            clause,
            QueryExpr::QueryString {
                field: "debtor_address".to_string(),
                query: "123~2 AND MAIN~2 AND ST~2".to_string(),
            }
        );
    }

    #[test]
    fn custom_fields_are_respected() {
        let options = QueryOptions {
            name_field: "name".to_string(),
            address_field: "address".to_string(),
            ..QueryOptions::default()
        };
        let query = build_query(&request("ACME", "AUSTIN", MatchMode::Permutation), &options)
            .expect("ok")
            .expect("query");
        assert_eq!(
            query.to_dsl(),
            json!({"bool": {"must": [
                {"match": {"name": "ACME"}},
                {"match": {"address": "AUSTIN"}}
            ]}})
        );
    }

    #[test]
    fn query_string_detection_walks_the_tree() {
        let plain = build("JOHN DOE", "DALLAS").expect("query");
        assert!(!plain.uses_query_string());

        let fuzzy = build_query(
            &request("JOHN", "DALLAS", MatchMode::Fuzzy),
            &QueryOptions::default(),
        )
        .expect("ok")
        .expect("query");
        assert!(fuzzy.uses_query_string());
    }
}
