//! Mind-map prompt shaping

/// Longest input still treated as a bare topic
const SIMPLE_TOPIC_MAX_CHARS: usize = 30;

/// Words that mark an input as an instruction rather than a topic
const INSTRUCTION_MARKERS: &[&str] = &[
    "请",
    "生成",
    "思维导图",
    "格式",
    "markdown",
    "please",
    "generate",
    "mind map",
    "mindmap",
    "format",
];

/// Layout template shared by the system message and wrapped topics
const LAYOUT_TEMPLATE: &str = "\
# [Topic]
## [Branch 1]
### [Sub-branch 1.1]
### [Sub-branch 1.2]
## [Branch 2]
### [Sub-branch 2.1]
#### [Detail 2.1.1]
#### [Detail 2.1.2]
### [Sub-branch 2.2]
## [Branch 3]
### [Sub-branch 3.1]
### [Sub-branch 3.2]";

/// System message constraining the mind-map layout
#[must_use]
pub fn mind_map_system_prompt() -> String {
    format!(
        "You are a mind-map generator.\n\
         1. Build a mind map for the topic the user provides.\n\
         2. Output Markdown only; levels are #, ##, ### and ####.\n\
         3. Follow the template below exactly and add no explanations.\n\
         4. Start directly with the first heading, with no preamble.\n\
         5. Group each level clearly and list siblings one per line.\n\
         6. Give every branch content; never leave a branch empty.\n\
         Template:\n{LAYOUT_TEMPLATE}"
    )
}

/// Whether `input` is a bare topic rather than a full instruction
#[must_use]
pub fn is_simple_topic(input: &str) -> bool {
    let input = input.trim();
    if input.is_empty() || input.chars().count() > SIMPLE_TOPIC_MAX_CHARS {
        return false;
    }
    let lowered = input.to_lowercase();
    !INSTRUCTION_MARKERS.iter().any(|m| lowered.contains(m))
}

/// User message for a mind-map request
///
/// Bare topics are wrapped into a full instruction; anything else is sent
/// as written. `extra` is appended on its own line.
#[must_use]
pub fn mind_map_user_prompt(topic: &str, extra: Option<&str>) -> String {
    let topic = topic.trim();
    let mut prompt = if is_simple_topic(topic) {
        format!(
            "Create a mind map about \"{topic}\" in Markdown using #, ##, ### and #### \
             for levels. Follow this template exactly, output only the mind map and \
             leave no branch empty:\n{LAYOUT_TEMPLATE}"
        )
    } else {
        topic.to_string()
    };
    if let Some(extra) = extra.map(str::trim).filter(|e| !e.is_empty()) {
        prompt.push('\n');
        prompt.push_str(extra);
    }
    prompt
}
