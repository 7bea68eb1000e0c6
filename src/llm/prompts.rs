//! Prompt templates for delegated sub-tasks, one per (backend, action) pair.

use crate::research::VisionJob;

pub fn web_search(query: &str) -> String {
    format!(
        r#"Search the web for the following, preferring Chinese-language sources.
Return each result with its title, a short summary, and its URL.

Search query: {query}

Return the results in a structured list."#
    )
}

pub fn summarize_url(url: &str) -> String {
    format!(
        "Summarize the main content of the following web page. Keep facts, figures, dates and named entities.\n\n{url}"
    )
}

/// Generic analysis. Also the entry point used when the reasoning backend fails over.
pub fn analyze(content: &str) -> String {
    format!(
        r#"You are an expert on the Chinese market. Analyze the following content and extract the key facts and judgements.

{content}

Respond in a structured way:
1. Key facts
2. Possible risk points
3. What still needs verification"#
    )
}

pub fn company_analyze(content: &str) -> String {
    format!(
        r#"You are an analyst of Chinese company information. Analyze the following company information.

{content}

Assess:
1. The company's general standing (normal / abnormal)
2. Whether it is an actual manufacturer or a trading company
3. Credibility
4. What still needs verification"#
    )
}

pub fn optimize_query(query: &str) -> String {
    format!(
        "Turn the following research need into the best Chinese search keywords. Return 3-5 search queries, one per line.\n\n{query}"
    )
}

pub fn librarian_extract(content: &str) -> String {
    format!(
        r#"Act as a research librarian. From the material below, extract every distinct factual claim.
For each claim give: the claim, the supporting passage, the source URL if present, and the publication date if present.
Do not add facts that are not in the material.

{content}"#
    )
}

pub fn dedupe_evidence(content: &str) -> String {
    format!(
        r#"The following is a list of evidence items. Merge items that state the same fact from the same or dependent sources,
keep items backed by independent sources separate, and return the deduplicated list with the ids that were merged.

{content}"#
    )
}

pub fn vision(job: VisionJob, input: &str) -> String {
    let instruction = match job {
        VisionJob::ScreenshotSummary => {
            "Summarize what this web page screenshot shows: page type, key text, prices, company names and dates."
        }
        VisionJob::DocumentOcr => {
            "Transcribe the text of this document image (business licence, certificate or similar) verbatim, then list its key fields."
        }
        VisionJob::LabelRead => {
            "Read the product label in this image and list brand, model, manufacturer, address and certification marks."
        }
    };
    format!("{instruction}\n\n{input}")
}
