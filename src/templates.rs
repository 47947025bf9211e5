//! Fixed query templates.
//!
//! When the language model is unavailable the session falls back to a small
//! library of canned, pre-validated statements keyed by question keywords.
//! Selection is deterministic: first matching entry wins, and there is
//! always a default. The one piece of parameterization is the filing-state
//! filter, resolved from a fixed state-name table, so the common
//! "companies in <state>" question still works without a model.

/// A canned statement with its activation keywords.
#[derive(Debug, Clone)]
struct QueryTemplate {
    /// Short identifier for logs.
    name: &'static str,
    /// Keywords matched case-insensitively against the question.
    keywords: &'static [&'static str],
    /// The statement; `{state}` is substituted when present.
    sql: &'static str,
}

/// A selected template with its parameters resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    /// Identifier of the template that matched.
    pub name: &'static str,
    /// Ready-to-validate SQL.
    pub sql: String,
}

/// State names recognized in questions, with their filing_state codes.
const STATES: &[(&str, &str)] = &[
    ("california", "CA"),
    ("new york", "NY"),
    ("texas", "TX"),
    ("florida", "FL"),
    ("washington", "WA"),
    ("illinois", "IL"),
    ("colorado", "CO"),
    ("georgia", "GA"),
];

/// The template library, in match-priority order.
const TEMPLATES: &[QueryTemplate] = &[
    QueryTemplate {
        name: "information-requests",
        keywords: &["information request", "review queue"],
        sql: "SELECT id, company_id, submission_state, situation, queue, created_at \
              FROM bi.information_requests \
              ORDER BY created_at DESC LIMIT 100",
    },
    QueryTemplate {
        name: "losses",
        keywords: &["loss", "losses", "payment", "ato"],
        sql: "SELECT company_id, event_id, event_debit_date, event_gross_amount, \
              recovered_amount, net_loss_amount \
              FROM bi_reporting.gusto_payments_and_losses \
              ORDER BY event_debit_date DESC LIMIT 100",
    },
    QueryTemplate {
        name: "employees",
        keywords: &["employee", "department", "team"],
        sql: "SELECT id, name, department_name, work_state, status \
              FROM bi.gusto_employees \
              ORDER BY name LIMIT 100",
    },
    QueryTemplate {
        name: "penalties",
        keywords: &["penalty", "penalties", "agency"],
        sql: "SELECT id, agency_name, year, quarter, total_penalty_amount, status \
              FROM bi.penalty_cases \
              ORDER BY created_at DESC LIMIT 100",
    },
    QueryTemplate {
        name: "delinquencies",
        keywords: &["delinquen", "past due", "recovery"],
        sql: "SELECT company_id, name, payment_id, debit_amount_attempted, \
              days_past_due, delinquent_status \
              FROM bi.credit_delinquencies \
              ORDER BY days_past_due DESC LIMIT 100",
    },
    QueryTemplate {
        name: "companies-by-state",
        keywords: &[], // selected via the state table, not keywords
        sql: "SELECT id, name, filing_state, number_active_employees, created_at \
              FROM bi.companies \
              WHERE filing_state = '{state}' \
              ORDER BY created_at DESC LIMIT 100",
    },
    QueryTemplate {
        name: "companies",
        keywords: &["compan", "customer"],
        sql: "SELECT id, name, filing_state, number_active_employees, created_at \
              FROM bi.companies \
              ORDER BY created_at DESC LIMIT 100",
    },
];

/// Deterministic keyword-matched template lookup.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary;

impl TemplateLibrary {
    /// Creates the library.
    pub fn new() -> Self {
        Self
    }

    /// Selects and renders the template for a question: first keyword
    /// match wins; a recognized state name upgrades a companies question to
    /// the filtered variant; the companies template is the default.
    pub fn select(&self, question: &str) -> RenderedTemplate {
        let question = question.to_lowercase();

        if let Some(template) = TEMPLATES
            .iter()
            .filter(|t| !t.keywords.is_empty())
            .find(|t| t.keywords.iter().any(|k| question.contains(k)))
        {
            if template.name == "companies" {
                if let Some(state) = detect_state(&question) {
                    return render("companies-by-state", state);
                }
            }
            return RenderedTemplate {
                name: template.name,
                sql: template.sql.to_string(),
            };
        }

        if let Some(state) = detect_state(&question) {
            return render("companies-by-state", state);
        }

        let default = &TEMPLATES[TEMPLATES.len() - 1];
        RenderedTemplate {
            name: default.name,
            sql: default.sql.to_string(),
        }
    }

    /// Names of all templates, for diagnostics.
    pub fn names(&self) -> Vec<&'static str> {
        TEMPLATES.iter().map(|t| t.name).collect()
    }
}

fn detect_state(question: &str) -> Option<&'static str> {
    STATES
        .iter()
        .find(|(name, _)| question.contains(name))
        .map(|(_, code)| *code)
}

fn render(name: &'static str, state: &str) -> RenderedTemplate {
    let template = TEMPLATES
        .iter()
        .find(|t| t.name == name)
        .unwrap_or(&TEMPLATES[TEMPLATES.len() - 1]);
    RenderedTemplate {
        name: template.name,
        sql: template.sql.replace("{state}", state),
    }
}
