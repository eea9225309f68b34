//! Prompt 模板：`{placeholder}` 占位，由 [`fill`] 替换

/// 单遍替换 `{key}` 占位符；替换进来的值不会再被展开，未知占位符原样保留
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            vars.iter()
                .find(|(k, _)| *k == &after[..close])
                .map(|(k, v)| (k.len(), *v))
        });
        match value {
            Some((key_len, v)) => {
                out.push_str(v);
                rest = &after[key_len + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

pub const SEGMENT_PLAN: &str = "\
You are given an implementation plan. Break it down into an ordered list of small, \
self-contained steps that can each be carried out with a few tool calls. \
Keep the original order and do not invent work the plan does not ask for.

Plan:
{plan}";

pub const STEP_DECISION: &str = "\
You are an agent executing a plan one step at a time.

Current step:
{current_step}

Steps already completed:
{previous_steps}

Full plan:
{plan}

Context:
{context}

Actions taken so far for the current step:
{action_history}

Available tools:
{tools}

Tool call format:
{tool_call_format}

If the current step still needs information or actions, reply ONLY with a JSON tool call \
(one call, or several independent calls at once). \
When the current step is finished, reply with a short plain-text summary and no JSON.";

pub const FILE_PLANNER: &str = "\
You help a developer with a task on the project at {project_path}.

Task:
{user_task}

Project structure:
{project_structure}

List the files (paths relative to the project root) whose contents are needed to complete the task.";

pub const FILE_REFLECTION: &str = "\
You are reviewing the files gathered for a task on the project at {project_path}.

Task:
{user_task}

Project structure:
{project_structure}

Files gathered so far:
{context}

If other files are needed to complete the task, list them. Return an empty list when the context is sufficient.";

pub const FINAL_CONTEXT: &str = "\
Project path: {project_path}

Project structure:
{project_structure}

Relevant files:
{context}";

pub const INPUT_TYPE: &str = "\
Decide whether the following user input is a question to be answered or a task to be carried out. \
Reply with exactly one word: question or task.

User input:
{user_input}";

pub const ANSWER_QUESTION: &str = "\
Answer the user's question using the context below.

Context:
{context}

Question:
{user_input}";

pub const MAKE_PLAN: &str = "\
Write a concrete, ordered implementation plan for the task below, based on the given context.

Task:
{user_task}

Context:
{context}";

pub const WEB_PLAN: &str = "\
Write a concrete, ordered plan for accomplishing the task below in a web browser. \
The browser is open on the page described in the context.

Task:
{user_task}

Context:
{context}";
