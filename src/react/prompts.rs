//! 各类 agent 的提示词构建
//!
//! 同一个 ToolCallAgent 通过注入不同的 PromptBuilder 得到 Manus / Browser / File / Python 四种特化；
//! 模板只做 `{key}` 替换，未知占位符原样保留。

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;
use regex::Regex;

use crate::react::StepInput;

/// 每一步发给模型的 user 提示（所有特化共用）
pub const STEP_PROMPT: &str = "CURRENT PLAN STATUS:
{plan_status}

YOUR CURRENT TASK:
You are now working on step {current_step_index}: {step_text}

Please execute this step using the appropriate tools.
When you're done with current step, provide the result data of this step, call summary record the result of current step.";

/// 规划提示（编排器创建初始计划时使用）
pub const PLANNING_PROMPT: &str = "Create a reasonable plan with clear steps to accomplish the task.

Available Agents Information:
{agents_info}

Task to accomplish:
{query}

You can use the planning tool to help you create the plan, assign {plan_id} as the plan id.

Important: For each step in the plan, start with [AGENT_NAME] where AGENT_NAME is one of the available agents listed above.
For example: \"[BROWSERAGENT] Search for relevant information\" or \"[MANUS] Process the search results\"";

/// 计划收尾总结提示
pub const FINALIZE_PROMPT: &str = "Based on the execution history and the final plan status:

Plan Status:
{plan_status}

Please analyze:
1. What was the original user request?
2. What steps were executed successfully?
3. Were there any challenges or failures?
4. What specific results were achieved?

Provide a clear and concise response addressing:
- Direct answer to the user's original question
- Key accomplishments and findings
- Any relevant data or metrics collected
- Recommendations or next steps (if applicable)

Format your response in a user-friendly way.";

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").unwrap())
}

/// 用 vars 替换模板中的 `{key}`
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    placeholder()
        .replace_all(template, |caps: &regex::Captures| {
            vars.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// 提示词构建器：决定 system 提示、附加的下一步提示以及模板变量
pub trait PromptBuilder: Send + Sync {
    fn system_prompt(&self) -> &str;

    /// 追加在步骤提示之后的引导；默认无
    fn next_step_prompt(&self) -> Option<&str> {
        None
    }

    /// 模板变量；特化可在步骤输入之外补充自己的状态
    fn vars(&self, conversation_id: &str, input: &StepInput) -> HashMap<String, String> {
        let _ = conversation_id;
        input.vars()
    }

    /// act 完成后回调，用于记录特化自身关心的状态
    fn observe(&self, conversation_id: &str, result: &str) {
        let _ = (conversation_id, result);
    }

    /// 会话结束后丢弃 observe 记录的状态
    fn release(&self, conversation_id: &str) {
        let _ = conversation_id;
    }

    /// 组装 (system, user) 两段文本
    fn build(&self, conversation_id: &str, input: &StepInput) -> (String, String) {
        let vars = self.vars(conversation_id, input);
        let mut user = render(STEP_PROMPT, &vars);
        if let Some(next) = self.next_step_prompt() {
            user.push_str("\n\n");
            user.push_str(&render(next, &vars));
        }
        (render(self.system_prompt(), &vars), user)
    }
}

/// 通用 agent
#[derive(Debug, Default)]
pub struct ManusPrompt;

impl PromptBuilder for ManusPrompt {
    fn system_prompt(&self) -> &str {
        "You are Manus, an all-capable AI assistant, aimed at solving any task presented by the user. \
You have various tools at your disposal that you can call upon to efficiently complete complex requests. \
Whether it's programming, information retrieval, file processing, or web browsing, you can handle it all."
    }
}

/// 浏览器 agent；页面状态来自步骤输入的可选键，缺省为空
#[derive(Debug, Default)]
pub struct BrowserPrompt;

const BROWSER_KEYS: [&str; 6] = [
    "url_placeholder",
    "tabs_placeholder",
    "interactive_elements",
    "content_above_placeholder",
    "content_below_placeholder",
    "results_placeholder",
];

impl PromptBuilder for BrowserPrompt {
    fn system_prompt(&self) -> &str {
        "You are an AI agent designed to automate browser tasks. Your goal is to accomplish the ultimate task following the rules.

# Response Rules
1. ELEMENT INTERACTION:
- Only use indexed elements
- Watch for non-interactive elements

2. NAVIGATION & ERROR HANDLING:
- Try alternative approaches if stuck
- Handle popups and cookies
- Open new tabs for research
- Wait for page loads

3. TASK COMPLETION:
- Track progress in memory
- Count iterations for repeated tasks
- Include all findings in results

4. EXTRACTION:
- Use extract_content for information gathering"
    }

    fn next_step_prompt(&self) -> Option<&str> {
        Some(
            "What should I do next to achieve my goal?

When you see [Current state starts here], focus on the following:
- Current URL and page title:
{url_placeholder}

- Available tabs:
{tabs_placeholder}

- Interactive elements and their indices:
{interactive_elements}

- Content above {content_above_placeholder} or below {content_below_placeholder} the viewport (if indicated)

- Any action results or errors:
{results_placeholder}

Remember:
1. Use 'get_text' action to obtain page content instead of scrolling
2. Focus on text-based information extraction
3. IMPORTANT: You MUST use at least one tool in your response to make progress!",
        )
    }

    fn vars(&self, _conversation_id: &str, input: &StepInput) -> HashMap<String, String> {
        let mut vars = input.vars();
        for key in BROWSER_KEYS {
            vars.entry(key.to_string()).or_default();
        }
        vars
    }
}

/// 记录每个会话最近一次 act 结果（File / Python 特化共用）
#[derive(Debug, Default)]
struct LastResults(Mutex<HashMap<String, String>>);

impl LastResults {
    fn get(&self, conversation_id: &str) -> Option<String> {
        self.0.lock().get(conversation_id).cloned()
    }

    fn set(&self, conversation_id: &str, result: &str) {
        self.0
            .lock()
            .insert(conversation_id.to_string(), result.to_string());
    }

    fn remove(&self, conversation_id: &str) {
        self.0.lock().remove(conversation_id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.lock().len()
    }
}

fn working_directory() -> String {
    std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| ".".to_string())
}

/// 文件操作 agent
#[derive(Debug, Default)]
pub struct FilePrompt {
    last: LastResults,
}

impl PromptBuilder for FilePrompt {
    fn system_prompt(&self) -> &str {
        "You are an AI agent specialized in file operations. Your goal is to handle file-related tasks effectively and safely.

# Response Rules
1. FILE OPERATIONS:
- Always validate file paths
- Check file existence
- Handle different file types

2. ERROR HANDLING:
- Check file permissions
- Handle missing files
- Validate content format

3. TASK COMPLETION:
- Verify file operations
- Provide clear summaries"
    }

    fn next_step_prompt(&self) -> Option<&str> {
        Some(
            "What should I do next to achieve my goal?

Current File Operation State:
- Working Directory: {working_directory}
- Last File Operation: {last_operation}
- Last Operation Result: {operation_result}

Remember:
1. Check file existence before operations
2. Handle potential errors
3. IMPORTANT: You MUST use at least one tool in your response to make progress!",
        )
    }

    fn vars(&self, conversation_id: &str, input: &StepInput) -> HashMap<String, String> {
        let mut vars = input.vars();
        vars.insert("working_directory".into(), working_directory());
        match self.last.get(conversation_id) {
            Some(result) => {
                vars.insert("last_operation".into(), "file_operation".into());
                vars.insert("operation_result".into(), result);
            }
            None => {
                vars.insert("last_operation".into(), "None".into());
                vars.insert("operation_result".into(), "None".into());
            }
        }
        vars
    }

    fn observe(&self, conversation_id: &str, result: &str) {
        self.last.set(conversation_id, result);
    }

    fn release(&self, conversation_id: &str) {
        self.last.remove(conversation_id);
    }
}

/// Python 执行 agent
#[derive(Debug, Default)]
pub struct PythonPrompt {
    last: LastResults,
}

impl PromptBuilder for PythonPrompt {
    fn system_prompt(&self) -> &str {
        "You are an AI agent specialized in Python programming and execution. Your goal is to accomplish Python-related tasks effectively and safely.

# Response Rules
1. CODE EXECUTION:
- Always validate inputs
- Handle exceptions properly
- Use appropriate Python libraries

2. TASK COMPLETION:
- Verify results
- Provide clear summaries"
    }

    fn next_step_prompt(&self) -> Option<&str> {
        Some(
            "What should I do next to achieve my goal?

Current Execution State:
- Working Directory: {working_directory}
- Last Execution Result: {last_result}

Remember:
1. Use the python execution tool for direct Python code execution
2. IMPORTANT: You MUST use at least one tool in your response to make progress!",
        )
    }

    fn vars(&self, conversation_id: &str, input: &StepInput) -> HashMap<String, String> {
        let mut vars = input.vars();
        vars.insert("working_directory".into(), working_directory());
        vars.insert(
            "last_result".into(),
            self.last
                .get(conversation_id)
                .unwrap_or_else(|| "No previous execution".to_string()),
        );
        vars
    }

    fn observe(&self, conversation_id: &str, result: &str) {
        self.last.set(conversation_id, result);
    }

    fn release(&self, conversation_id: &str) {
        self.last.remove(conversation_id);
    }
}
