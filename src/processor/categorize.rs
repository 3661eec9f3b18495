//! Keyword-based area-of-law classification

use crate::config::CategoryRuleConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Area of law a document is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Constitutional,
    Civil,
    Criminal,
    Labor,
    Administrative,
    Tax,
    Commercial,
    Procedural,
    Environmental,
    Consumer,
    Uncategorized,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Self::Constitutional,
        Self::Civil,
        Self::Criminal,
        Self::Labor,
        Self::Administrative,
        Self::Tax,
        Self::Commercial,
        Self::Procedural,
        Self::Environmental,
        Self::Consumer,
        Self::Uncategorized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constitutional => "constitutional",
            Self::Civil => "civil",
            Self::Criminal => "criminal",
            Self::Labor => "labor",
            Self::Administrative => "administrative",
            Self::Tax => "tax",
            Self::Commercial => "commercial",
            Self::Procedural => "procedural",
            Self::Environmental => "environmental",
            Self::Consumer => "consumer",
            Self::Uncategorized => "uncategorized",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Portuguese label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Constitutional => "Constitucional",
            Self::Civil => "Civil",
            Self::Criminal => "Penal",
            Self::Labor => "Trabalhista",
            Self::Administrative => "Administrativo",
            Self::Tax => "Tributário",
            Self::Commercial => "Comercial",
            Self::Procedural => "Processual",
            Self::Environmental => "Ambiental",
            Self::Consumer => "Consumidor",
            Self::Uncategorized => "Geral",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_keywords(category: Category) -> &'static [&'static str] {
    match category {
        Category::Constitutional => &["constituição", "constitucional", "supremo", "stf", "fundamental"],
        Category::Civil => &["civil", "contrato", "propriedade", "responsabilidade", "danos"],
        Category::Criminal => &["penal", "crime", "criminoso", "pena", "delito", "prisão"],
        Category::Labor => &["trabalhista", "emprego", "salário", "tst", "trabalho", "empregado"],
        Category::Administrative => &["administrativo", "servidor", "público", "licitação", "concurso"],
        Category::Tax => &["tributário", "imposto", "tributo", "receita", "fiscal", "icms", "ipi"],
        Category::Commercial => &["comercial", "empresa", "sociedade", "falência", "recuperação"],
        Category::Procedural => &["processual", "recurso", "apelação", "embargos", "processo"],
        Category::Environmental => &["ambiental", "meio ambiente", "poluição", "recursos naturais"],
        Category::Consumer => &["consumidor", "fornecedor", "produto", "serviço", "cdc"],
        Category::Uncategorized => &[],
    }
}

/// Ordered keyword rules; earlier rules win ties
#[derive(Debug, Clone)]
pub struct CategoryRules {
    rules: Vec<(Category, Vec<String>)>,
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self::with_overrides(&[])
    }
}

impl CategoryRules {
    /// Built-in rules with configured keyword lists replacing the defaults
    pub fn with_overrides(overrides: &[CategoryRuleConfig]) -> Self {
        let rules = Category::ALL
            .into_iter()
            .filter(|c| *c != Category::Uncategorized)
            .map(|category| {
                let keywords = match overrides.iter().rfind(|o| o.category == category) {
                    Some(o) => o
                        .keywords
                        .iter()
                        .map(|k| k.trim().to_lowercase())
                        .filter(|k| !k.is_empty())
                        .collect(),
                    None => default_keywords(category)
                        .iter()
                        .map(|k| k.to_string())
                        .collect(),
                };
                (category, keywords)
            })
            .collect();
        Self { rules }
    }

    /// Picks the category with the most distinct keyword hits
    ///
    /// Keywords match at the start of a word, so `pena` hits `penal` but not
    /// `apenas`. No hits at all yields `Uncategorized`.
    pub fn categorize(&self, title: &str, text: &str) -> Category {
        let content = format!("{} {}", title, text).to_lowercase();

        let mut best = Category::Uncategorized;
        let mut best_score = 0;
        for (category, keywords) in &self.rules {
            let score = keywords
                .iter()
                .filter(|k| contains_word_prefix(&content, k))
                .count();
            if score > best_score {
                best = *category;
                best_score = score;
            }
        }
        best
    }
}

fn contains_word_prefix(haystack: &str, keyword: &str) -> bool {
    haystack.match_indices(keyword).any(|(i, _)| {
        haystack[..i]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric())
    })
}
