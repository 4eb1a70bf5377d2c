//! Prompt text and message builders for every model call the pipeline makes.

use serde_json::json;

use crate::catalog::EvidenceCatalog;
use crate::llm::ChatMessage;
use crate::pipeline::PaperOutcome;
use crate::text_utils::clean_text;
use crate::{ChunkSummary, PaperRecord, SourceType, TextChunk};

pub const NOT_SPECIFIED: &str = "Not specified";

pub const ABSTRACT_OUTPUT_PROMPT: &str = "只基于给定的论文 abstract 回答，禁止使用外部信息和臆测。

请输出 Markdown，包含以下 4 节：

[1] 文章做了什么事
[2] 文章的创新点是什么
[3] 文章解决了什么问题
[4] 效果怎么样

要求：
- 每节 2-5 条要点，简洁明确。
- 如果 abstract 没提到，写“Abstract未明确说明”。
- 在末尾追加“[依据]”小节，列 2-5 条你依据的 abstract 关键句（可简短摘录或近义转述）。
";

pub const FINAL_OUTPUT_PROMPT: &str = "Write a Markdown report with exactly these sections:

[1] Problem and motivation
[2] Core idea and contributions
[3] Method / approach details
[4] Architecture and training setup
[5] Experimental setup (datasets, baselines, metrics)
[6] Main results
[7] Ablations and analysis
[8] Limitations and open questions
[9] Evidence (one line per claim group, citing catalog entries as `C###: (pointer)`)

Use 2-6 bullets per section.";

const CHUNK_SYSTEM: &str =
    "You are a careful research paper reader. Use only the provided chunk text.";
const SYNTHESIS_SYSTEM: &str =
    "You are a research collaborator. Produce concise, technical, structured Markdown.";
const ABSTRACT_SYSTEM: &str =
    "You are a concise research assistant. Answer only from the provided abstract.";
const DIGEST_SYSTEM: &str = "You are an efficient research analyst.";

fn date_or_unspecified(paper: &PaperRecord) -> &str {
    if paper.published_date.trim().is_empty() {
        NOT_SPECIFIED
    } else {
        &paper.published_date
    }
}

/// Per-chunk fact extraction, restricted to the chunk's own text.
pub fn chunk_messages(paper: &PaperRecord, chunk: &TextChunk) -> Vec<ChatMessage> {
    let user = format!(
        "Read this paper chunk and extract grounded facts. \
         Focus on Method/Approach and Experiments/Evaluation. \
         If missing, use '{NOT_SPECIFIED}'.\n\n\
         Paper title: {title}\n\
         arXiv ID: {id}\n\
         Evidence pointer: {evidence}\n\
         Chunk ID: {chunk_id}\n\n\
         Return strict JSON:\n\
         {{\n  \
         \"key_points\": [\"...\"],\n  \
         \"method_details\": [\"...\"],\n  \
         \"experiment_details\": [\"...\"],\n  \
         \"resources\": [\"...\"],\n  \
         \"reasoning_brief\": [\"3-6 short bullets of visible reasoning based only on this chunk\"]\n\
         }}\n\n\
         Chunk text:\n{text}",
        title = paper.title,
        id = paper.arxiv_id,
        evidence = chunk.evidence,
        chunk_id = chunk.id,
        text = chunk.text,
    );
    vec![ChatMessage::system(CHUNK_SYSTEM), ChatMessage::user(user)]
}

fn json_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

/// `### C001` blocks carrying each chunk's evidence and extracted fields.
pub fn summaries_blob(summaries: &[ChunkSummary]) -> String {
    summaries
        .iter()
        .map(|s| {
            format!(
                "### {}\nEvidence: {}\nkey_points: {}\nmethod_details: {}\nexperiment_details: {}\nresources: {}",
                s.chunk_id,
                s.evidence_pointer,
                json_list(&s.facts.key_points),
                json_list(&s.facts.method_details),
                json_list(&s.facts.experiment_details),
                json_list(&s.facts.resources),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Final synthesis. The model sees only the catalog and the chunk summaries.
pub fn synthesis_messages(
    paper: &PaperRecord,
    source_type: SourceType,
    catalog: &EvidenceCatalog,
    summaries: &[ChunkSummary],
) -> Vec<ChatMessage> {
    let user = format!(
        "Read this paper as a research collaborator.\n\n\
         {FINAL_OUTPUT_PROMPT}\n\n\
         Constraints:\n\
         - Use only the section summaries and evidence catalog below.\n\
         - Do not fabricate any claim or citation.\n\
         - In [9], only cite evidence pointers from the catalog exactly as written.\n\
         - If a requested item is not present, write '{NOT_SPECIFIED}'.\n\n\
         Paper metadata:\nTitle: {title}\narXiv ID: {id}\nDate: {date}\nSource type: {source_type}\n\n\
         Evidence catalog:\n{catalog}\n\n\
         Section summaries:\n{blob}",
        title = paper.title,
        id = paper.arxiv_id,
        date = date_or_unspecified(paper),
        catalog = catalog.render(),
        blob = summaries_blob(summaries),
    );
    vec![ChatMessage::system(SYNTHESIS_SYSTEM), ChatMessage::user(user)]
}

/// Abstract-only summary. Returns `None` when the abstract is blank.
pub fn abstract_messages(paper: &PaperRecord) -> Option<Vec<ChatMessage>> {
    let abstract_text = clean_text(&paper.abstract_text);
    if abstract_text.is_empty() {
        return None;
    }
    let user = format!(
        "{ABSTRACT_OUTPUT_PROMPT}\n\n\
         Title: {title}\n\
         arXiv ID: {id}\n\
         Date: {date}\n\n\
         Abstract:\n{abstract_text}",
        title = paper.title,
        id = paper.arxiv_id,
        date = date_or_unspecified(paper),
    );
    Some(vec![
        ChatMessage::system(ABSTRACT_SYSTEM),
        ChatMessage::user(user),
    ])
}

/// Daily digest over successful outcomes only. `None` when there are none.
pub fn digest_messages(outcomes: &[PaperOutcome]) -> Option<Vec<ChatMessage>> {
    let payload: Vec<_> = outcomes
        .iter()
        .filter(|o| o.record.is_success())
        .map(|o| {
            json!({
                "arxiv_id": o.record.arxiv_id,
                "summary_excerpt": o.summary_excerpt,
            })
        })
        .collect();
    if payload.is_empty() {
        return None;
    }
    let payload = serde_json::to_string(&payload).unwrap_or_else(|_| "[]".to_string());
    let user = format!(
        "Create a daily research paper report from the summaries below.\n\
         Output Markdown with sections:\n\
         1) Daily highlights\n\
         2) Method trends\n\
         3) Evaluation patterns\n\
         4) Risks and open gaps\n\
         5) Suggested follow-up reading order\n\n\
         If no evidence for an item, write '{NOT_SPECIFIED}'.\n\n\
         Input summaries JSON:\n{payload}"
    );
    Some(vec![ChatMessage::system(DIGEST_SYSTEM), ChatMessage::user(user)])
}
