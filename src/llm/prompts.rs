//! Prompt templates for the five LLM protocol calls (§4.1), in two locale
//! tables selected by `config.language`. English wording is a from-scratch
//! paraphrase of `original_source`'s `_prompts-en.py`; the Chinese table
//! likewise paraphrases `_prompts-en.py`/`_sentinel_prompts_zh.py`. This is
//! the only module allowed to format prompt text — everything else passes
//! data in and gets a `String` out.

use crate::config::Language;

pub fn system_message(language: Language, date_today: &str) -> String {
    match language {
        Language::En => format!(
            "You are an orchestrator coordinating a team of specialized agents to complete a user's task.\n\
             You can ask agents to browse the web, run code, inspect files, generate documents, or ask the user.\n\
             The date today is: {date_today}"
        ),
        Language::Zh => format!(
            "你是协调一组专用代理完成用户任务的编排器。\n\
             你可以让代理浏览网页、运行代码、检查文件、生成文档，或询问用户。\n\
             今天的日期是：{date_today}"
        ),
    }
}

pub fn plan_prompt(language: Language, task: &str, team_description: &str, prior_plan_hints: &str, sentinel_enabled: bool) -> String {
    let sentinel_note = if sentinel_enabled { sentinel_step_note(language) } else { String::new() };
    let hints_note = if prior_plan_hints.is_empty() { String::new() } else { hints_note(language, prior_plan_hints) };
    match language {
        Language::En => format!(
            "You have access to the following team members, each with their own expertise:\n{team_description}\n\
             There is no requirement to involve every team member; only include those actually needed.\n\
             The task is:\n{task}\n{hints_note}\n\
             If the task can be answered directly without a plan, set needs_plan=false and put the answer in \
             `response`. Otherwise produce an ordered list of steps, each with `title`, `details`, and `agent_name` \
             (one of the team members above).{sentinel_note}\n\n\
             Respond with a single JSON object with keys: task, needs_plan, response, plan_summary, steps. \
             Output JSON only, nothing else."
        ),
        Language::Zh => format!(
            "你可以使用以下团队成员，每个成员都有各自的专长：\n{team_description}\n\
             不要求涉及每一位团队成员；只包含实际需要的。\n\
             任务是：\n{task}\n{hints_note}\n\
             如果无需计划即可直接回答，将 needs_plan 设为 false，并把答案放在 `response` 中。\
             否则，给出一个有序的步骤列表，每个步骤包含 `title`、`details` 和 `agent_name`（上述团队成员之一）。\
             {sentinel_note}\n\n\
             请用单个 JSON 对象回复，字段为：task, needs_plan, response, plan_summary, steps。只输出 JSON。"
        ),
    }
}

/// Folds prior-plan suggestions from the memory provider into the
/// planning prompt under `retrieve_relevant_plans="hint"` (§4.3/§6.4).
fn hints_note(language: Language, prior_plan_hints: &str) -> String {
    match language {
        Language::En => format!(
            "\nFor reference, here are plans that succeeded on similar past tasks — adapt them if helpful, but \
             do not copy blindly:\n{prior_plan_hints}\n"
        ),
        Language::Zh => format!("\n供参考，以下是过去类似任务中成功的计划——如有帮助可加以调整，但不要盲目照搬：\n{prior_plan_hints}\n"),
    }
}

fn sentinel_step_note(language: Language) -> String {
    match language {
        Language::En => " A step may instead be a sentinel step that polls a condition over time: set \
             `step_type=\"SentinelPlanStep\"`, `sleep_duration` (seconds between checks), and `condition` (either \
             an integer repeat count, or natural-language text describing when the step is done). Do not mention \
             monitoring or polling cadence in `details` — `details` should read like an ordinary instruction."
            .to_string(),
        Language::Zh => " 一个步骤也可以是哨兵步骤，随时间轮询一个条件：设置 `step_type=\"SentinelPlanStep\"`、\
             `sleep_duration`（检查间隔秒数）和 `condition`（整数重复次数，或描述完成条件的自然语言文本）。\
             不要在 `details` 中提及监控或轮询节奏——`details` 应读起来像一条普通指令。"
            .to_string(),
    }
}

pub fn replan_prompt(
    language: Language,
    task: &str,
    team_description: &str,
    current_plan: &str,
    transcript: &str,
    sentinel_enabled: bool,
) -> String {
    let intro = match language {
        Language::En => format!(
            "We are trying to complete:\n{task}\n\nThe plan we attempted was:\n{current_plan}\n\n\
             Here is what has happened so far:\n{transcript}\n\n\
             We have not been able to make progress. Produce a new plan that addresses why the previous one stalled.\n\n"
        ),
        Language::Zh => format!(
            "我们正在尝试完成：\n{task}\n\n此前尝试的计划是：\n{current_plan}\n\n\
             到目前为止发生的事情：\n{transcript}\n\n\
             我们未能取得进展。请给出一个新的计划，解决之前计划停滞的原因。\n\n"
        ),
    };
    format!("{intro}{}", plan_prompt(language, task, team_description, "", sentinel_enabled))
}

pub fn ledger_prompt(language: Language, task: &str, plan_pretty: &str, transcript: &str, eligible_agent_names: &str) -> String {
    match language {
        Language::En => format!(
            "Recall we are working on:\n{task}\n\nThis is our current plan:\n{plan_pretty}\n\n\
             This is the transcript so far:\n{transcript}\n\n\
             Considering the transcript so far, assess: is the current step complete? Do we need to replan? \
             Who should act next (one of: {eligible_agent_names}), and what should they be told or asked?\n\n\
             Respond with a single JSON object with keys: is_current_step_complete {{answer, reason}}, \
             need_to_replan {{answer, reason}}, instruction_or_question {{answer, agent_name}}, progress_summary. \
             Output JSON only."
        ),
        Language::Zh => format!(
            "回忆一下我们正在处理：\n{task}\n\n这是我们当前的计划：\n{plan_pretty}\n\n\
             这是目前为止的记录：\n{transcript}\n\n\
             根据目前的记录，评估：当前步骤是否完成？是否需要重新计划？接下来应由谁行动\
             （以下之一：{eligible_agent_names}），应告知或询问他们什么？\n\n\
             请用单个 JSON 对象回复，字段为：is_current_step_complete {{answer, reason}}、\
             need_to_replan {{answer, reason}}、instruction_or_question {{answer, agent_name}}、\
             progress_summary。只输出 JSON。"
        ),
    }
}

pub fn condition_check_prompt(language: Language, step_description: &str, condition: &str, agent_response: &str) -> String {
    match language {
        Language::En => format!(
            "A sentinel step has the instruction:\n{step_description}\n\n\
             It is considered complete when the following condition holds:\n{condition}\n\n\
             The agent's latest response was:\n{agent_response}\n\n\
             Judge whether the condition is satisfied. If there is any ambiguity, prefer condition_met=false — it \
             is cheaper to check again later than to stop early. Suggest how long to wait before the next check: \
             shorter if a deadline is near or progress is fast, longer if progress is slow.\n\n\
             Respond with a single JSON object with keys: condition_met (bool), reason (text), sleep_duration \
             (positive integer seconds), sleep_duration_reason (text). Output JSON only."
        ),
        Language::Zh => format!(
            "一个哨兵步骤的指令是：\n{step_description}\n\n\
             当以下条件成立时视为完成：\n{condition}\n\n\
             代理最新的回复是：\n{agent_response}\n\n\
             判断条件是否满足。如有任何歧义，倾向于 condition_met=false——稍后再次检查的代价远小于过早停止。\
             建议下次检查前等待多久：若临近截止时间或进展很快则缩短，若进展缓慢则延长。\n\n\
             请用单个 JSON 对象回复，字段为：condition_met（布尔）、reason（文本）、\
             sleep_duration（正整数秒）、sleep_duration_reason（文本）。只输出 JSON。"
        ),
    }
}

pub fn final_answer_prompt(language: Language, task: &str, transcript: &str, custom: Option<&str>) -> String {
    if let Some(custom) = custom {
        return format!("{custom}\n\n{transcript}");
    }
    match language {
        Language::En => format!(
            "We were working on:\n{task}\n\n\
             The following messages record the steps taken to complete it:\n{transcript}\n\n\
             Using that information, give a final answer to the user. Make it easy to verify: reference the \
             relevant steps and include links where available. Note whether the answer came from a live lookup or \
             from general knowledge. Be concise but complete."
        ),
        Language::Zh => format!(
            "我们一直在处理：\n{task}\n\n\
             以下消息记录了为完成任务所采取的步骤：\n{transcript}\n\n\
             请据此给用户一个最终答案。使其易于核实：引用相关步骤，并在可能的情况下附上链接。\
             说明答案来自实时查询还是一般知识。请简洁但完整。"
        ),
    }
}

/// Direct port of the teacher's `get_agent_instruction` / the original's
/// `INSTRUCTION_AGENT_FORMAT` (§6.5): the canonical delivery envelope an
/// agent receives, independent of locale.
pub fn format_instruction(step_index: usize, step_title: &str, step_details: &str, agent_name: &str, instruction: &str) -> String {
    format!("Step {step_index}: {step_title}\n\n{step_details}\n\nInstruction for {agent_name}: {instruction}")
}

pub fn repair_hint(language: Language, reason: &str) -> String {
    match language {
        Language::En => format!(
            "Your last response was not valid JSON matching the required schema. Reason: {reason}. \
             Respond with JSON only."
        ),
        Language::Zh => format!(
            "你上一次的回复不是符合要求模式的有效 JSON。原因：{reason}。请只回复 JSON。"
        ),
    }
}
