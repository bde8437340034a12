//! Task classification and routing.
//!
//! [`route_task`] is a pure function: given a task description and optional
//! context, it decides what [`Category`] the task falls into, which
//! [`Strategy`] should execute it, how complex and long-running it's likely
//! to be, which tools it probably needs, and whether it needs a human in the
//! loop before it runs. None of this touches the network, the filesystem, or
//! any shared state — it's all string scoring over the description text.

use crate::domain::{Category, RoutingDecision, Strategy};
use std::collections::HashMap;
use std::sync::LazyLock;

struct KeywordSet(&'static [&'static str]);

impl KeywordSet {
    fn score(&self, text: &str, word_count: usize) -> f64 {
        if word_count == 0 {
            return 0.0;
        }
        let matches = self.0.iter().filter(|kw| text.contains(*kw)).count();
        matches as f64 / word_count as f64
    }
}

const FILE_KEYWORDS: KeywordSet = KeywordSet(&[
    "read", "write", "create", "delete", "copy", "move", "list", "directory", "folder", "file",
    "save", "load", "download", "upload",
]);
const CODE_KEYWORDS: KeywordSet = KeywordSet(&[
    "code", "program", "script", "function", "class", "debug", "refactor", "python",
    "javascript", "java", "cpp", "rust", "go", "implement", "algorithm", "syntax", "compile",
    "execute", "test",
]);
const ANALYSIS_KEYWORDS: KeywordSet = KeywordSet(&[
    "analyze", "analysis", "data", "statistics", "report", "summary", "compare", "evaluate",
    "assess", "review", "examine", "study",
]);
const SYSTEM_KEYWORDS: KeywordSet = KeywordSet(&[
    "system",
    "process",
    "service",
    "configuration",
    "settings",
    "install",
    "setup",
    "status",
    "performance",
]);
const DESKTOP_KEYWORDS: KeywordSet = KeywordSet(&[
    "window",
    "desktop",
    "click",
    "mouse",
    "keyboard",
    "screenshot",
    "clipboard",
    "focus",
    "ui",
    "automation",
    "gui",
    "interface",
    "type",
    "press",
    "key",
    "button",
    "screen",
]);
const MONITORING_KEYWORDS: KeywordSet = KeywordSet(&[
    "monitor",
    "monitoring",
    "cpu",
    "memory",
    "disk",
    "network",
    "resource",
    "usage",
    "stats",
    "statistics",
    "performance",
    "log",
    "logs",
    "ping",
    "connectivity",
    "health",
]);
const RESEARCH_KEYWORDS: KeywordSet = KeywordSet(&[
    "research",
    "find",
    "search",
    "lookup",
    "investigate",
    "explore",
    "information",
    "facts",
    "learn",
    "understand",
    "explain",
]);

static CATEGORY_TOOLS: LazyLock<HashMap<Category, Vec<&'static str>>> = LazyLock::new(|| {
    let mut m = HashMap::new();
    m.insert(
        Category::FileOperations,
        vec![
            "read_file",
            "write_file",
            "list_directory",
            "create_directory",
            "copy_file",
            "move_file",
            "delete_file",
            "search_files",
            "get_file_info",
        ],
    );
    m.insert(
        Category::CodeGeneration,
        vec!["read_file", "write_file", "search_files"],
    );
    m.insert(
        Category::DataAnalysis,
        vec!["read_file", "search_files", "get_file_info"],
    );
    m.insert(
        Category::SystemInteraction,
        vec!["list_directory", "get_file_info"],
    );
    m.insert(
        Category::DesktopAutomation,
        vec![
            "list_windows",
            "focus_window",
            "click_coordinates",
            "type_text",
            "take_screenshot",
            "get_clipboard",
            "set_clipboard",
            "press_key",
        ],
    );
    m.insert(
        Category::SystemMonitoring,
        vec![
            "list_processes",
            "get_cpu_stats",
            "get_memory_stats",
            "get_disk_stats",
            "get_network_stats",
            "ping_host",
            "check_port",
            "parse_log_file",
        ],
    );
    m.insert(Category::Research, vec![]);
    m.insert(Category::Hybrid, vec![]);
    m.insert(Category::General, vec![]);
    m
});

fn classify(text: &str) -> Category {
    let word_count = text.split_whitespace().count();
    let scores = [
        (Category::FileOperations, FILE_KEYWORDS.score(text, word_count)),
        (Category::CodeGeneration, CODE_KEYWORDS.score(text, word_count)),
        (Category::DataAnalysis, ANALYSIS_KEYWORDS.score(text, word_count)),
        (Category::SystemInteraction, SYSTEM_KEYWORDS.score(text, word_count)),
        (Category::DesktopAutomation, DESKTOP_KEYWORDS.score(text, word_count)),
        (Category::SystemMonitoring, MONITORING_KEYWORDS.score(text, word_count)),
        (Category::Research, RESEARCH_KEYWORDS.score(text, word_count)),
    ];

    let max_score = scores
        .iter()
        .map(|(_, s)| *s)
        .fold(f64::MIN, f64::max);
    let tied = scores.iter().filter(|(_, s)| *s == max_score).count();

    if max_score < 0.3 || tied > 1 {
        return Category::Hybrid;
    }

    scores
        .into_iter()
        .find(|(_, s)| *s == max_score)
        .map(|(c, _)| c)
        .unwrap_or(Category::General)
}

/// Deterministic table keyed on (category, secondary keywords), per
/// spec.md §4.E step 2 / `task_router.py::determine_strategy`:
/// file_ops -> mcp_only; code_gen -> local_llm_only, promoted to hybrid on a
/// persist-to-file keyword; data_analysis -> local_llm_only, hybrid if file
/// keywords are present; system_interaction/desktop_automation/
/// system_monitoring -> mcp_only; research -> local_llm_only; hybrid
/// category -> multi_step; else local_llm_only.
fn determine_strategy(category: Category, text: &str) -> Strategy {
    match category {
        Category::FileOperations => Strategy::McpOnly,
        Category::CodeGeneration => {
            if ["save", "write", "create file"].iter().any(|w| text.contains(w)) {
                Strategy::Hybrid
            } else {
                Strategy::LocalLlmOnly
            }
        }
        Category::DataAnalysis => {
            if ["file", "data", "csv", "json"].iter().any(|w| text.contains(w)) {
                Strategy::Hybrid
            } else {
                Strategy::LocalLlmOnly
            }
        }
        Category::SystemInteraction
        | Category::DesktopAutomation
        | Category::SystemMonitoring => Strategy::McpOnly,
        Category::Research => Strategy::LocalLlmOnly,
        Category::Hybrid => Strategy::MultiStep,
        Category::General => Strategy::LocalLlmOnly,
    }
}

fn estimate_complexity(text: &str, category: Category) -> u8 {
    let base: u8 = match category {
        Category::FileOperations => 2,
        Category::CodeGeneration => 3,
        Category::DataAnalysis => 3,
        Category::SystemInteraction => 3,
        Category::DesktopAutomation => 2,
        Category::SystemMonitoring => 2,
        Category::Research => 2,
        Category::Hybrid => 4,
        Category::General => 2,
    };

    let indicators: &[(&str, u8)] = &[
        ("multiple", 1),
        ("several", 1),
        ("complex", 1),
        ("advanced", 1),
        ("integrate", 1),
        ("combine", 1),
        ("analyze", 1),
        ("optimize", 1),
        ("comprehensive", 2),
        ("detailed", 1),
        ("thorough", 1),
    ];

    let mut complexity = base;
    for (word, adjustment) in indicators {
        if text.contains(word) {
            complexity += adjustment;
        }
    }

    complexity.clamp(1, 5)
}

fn estimate_duration(complexity: u8, strategy: Strategy) -> u64 {
    let base: u64 = match complexity {
        1 => 30,
        2 => 120,
        3 => 300,
        4 => 600,
        _ => 1800,
    };

    // spec.md §4.E step 4: {local:1.0, mcp:0.5, hybrid:1.5, multi_step:2.0, parallel:0.8}.
    let multiplier = match strategy {
        Strategy::LocalLlmOnly => 1.0,
        Strategy::McpOnly => 0.5,
        Strategy::Hybrid => 1.5,
        Strategy::MultiStep => 2.0,
        Strategy::Parallel => 0.8,
    };

    (base as f64 * multiplier) as u64
}

fn suggest_tools(category: Category, text: &str, strategy: Strategy) -> Vec<String> {
    let mut tools: Vec<String> = CATEGORY_TOOLS
        .get(&category)
        .into_iter()
        .flatten()
        .map(|s| s.to_string())
        .collect();

    if strategy == Strategy::Hybrid {
        tools.push("ollama_generate".to_string());
        tools.push("function_call".to_string());
    }

    for (keyword, tool) in [
        ("read", "read_file"),
        ("write", "write_file"),
        ("search", "search_files"),
    ] {
        if text.contains(keyword) {
            if let Some(pos) = tools.iter().position(|t| t == tool) {
                let value = tools.remove(pos);
                tools.insert(0, value);
            }
        }
    }

    tools.truncate(5);
    tools
}

fn calculate_confidence(category: Category, text: &str, word_count: usize) -> f64 {
    let mut confidence: f64 = 0.7;

    let keywords: &[&str] = match category {
        Category::FileOperations => &["file", "directory", "read", "write"],
        Category::CodeGeneration => &["code", "program", "script", "function"],
        Category::DataAnalysis => &["analyze", "data", "report"],
        Category::SystemInteraction => &["system", "process", "configuration"],
        Category::DesktopAutomation => &["window", "click", "screenshot", "desktop"],
        Category::SystemMonitoring => &["monitor", "cpu", "memory", "performance"],
        Category::Research => &["research", "find", "search", "explain"],
        Category::Hybrid | Category::General => &[],
    };

    if !keywords.is_empty() {
        let matches = keywords.iter().filter(|kw| text.contains(**kw)).count();
        confidence += (matches as f64 * 0.1).min(0.3);
    }

    if word_count < 5 {
        confidence -= 0.2;
    } else if word_count > 20 {
        confidence += 0.1;
    }

    confidence.clamp(0.1, 1.0)
}

fn category_label(category: Category) -> &'static str {
    match category {
        Category::FileOperations => "file operations",
        Category::CodeGeneration => "code generation",
        Category::DataAnalysis => "data analysis",
        Category::SystemInteraction => "system interaction",
        Category::DesktopAutomation => "desktop automation",
        Category::SystemMonitoring => "system monitoring",
        Category::Research => "research",
        Category::Hybrid => "hybrid",
        Category::General => "general",
    }
}

fn strategy_label(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::LocalLlmOnly => "local LLM only",
        Strategy::McpOnly => "MCP only",
        Strategy::Hybrid => "hybrid",
        Strategy::MultiStep => "multi step",
        Strategy::Parallel => "parallel",
    }
}

fn generate_reasoning(category: Category, strategy: Strategy, complexity: u8, tools: &[String]) -> String {
    let mut parts = vec![
        format!("Task categorized as {}", category_label(category)),
        format!("using {} strategy", strategy_label(strategy)),
        format!("with complexity level {complexity}/5"),
    ];

    if !tools.is_empty() {
        let preview: Vec<&str> = tools.iter().take(3).map(|s| s.as_str()).collect();
        parts.push(format!("requiring tools: {}", preview.join(", ")));
    }

    format!("{}.", parts.join(". "))
}

fn requires_human_approval(text: &str, complexity: u8) -> bool {
    if complexity >= 4 {
        return true;
    }

    let destructive = ["delete", "remove", "destroy", "wipe", "format"];
    if destructive.iter().any(|kw| text.contains(kw)) {
        return true;
    }

    let system_mods = ["install", "uninstall", "configure", "modify system"];
    system_mods.iter().any(|kw| text.contains(kw))
}

fn requires_context(text: &str, strategy: Strategy) -> bool {
    if matches!(strategy, Strategy::MultiStep | Strategy::Hybrid) {
        return true;
    }

    let deictic = ["this", "that", "current", "existing", "previous"];
    deictic.iter().any(|kw| text.contains(kw))
}

/// Classify `description` and produce a full [`RoutingDecision`].
///
/// Case-insensitive, deterministic, and side-effect free: calling this twice
/// with the same description always yields the same decision.
pub fn route_task(description: &str) -> RoutingDecision {
    let text = description.to_lowercase();
    let word_count = text.split_whitespace().count();

    let category = classify(&text);
    let strategy = determine_strategy(category, &text);
    let complexity = estimate_complexity(&text, category);
    let duration = estimate_duration(complexity, strategy);
    let tools = suggest_tools(category, &text, strategy);
    let confidence = calculate_confidence(category, &text, word_count);
    let reasoning = generate_reasoning(category, strategy, complexity, &tools);
    let approval = requires_human_approval(&text, complexity);
    let context = requires_context(&text, strategy);

    RoutingDecision {
        category,
        strategy,
        confidence,
        complexity,
        estimated_duration_secs: duration,
        suggested_tools: tools,
        requires_approval: approval,
        requires_context: context,
        reasoning,
    }
}
