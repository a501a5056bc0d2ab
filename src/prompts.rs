//! Prompt templates and context builders for the extraction engine.
//!
//! All generative workflows share one shape: gather prioritized
//! document excerpts, truncate deterministically, and embed them in a
//! fixed instruction block that demands strictly-structured JSON.

/// Summary fields requested from the model. Every field must come back
/// as `{value, confidence, evidence[]}`.
pub const SUMMARY_FIELDS: [&str; 20] = [
    "project_name",
    "project_owner",
    "main_contractor",
    "location",
    "submission_deadline",
    "site_visit_date",
    "clarification_deadline",
    "scope_of_work",
    "tender_bond",
    "contract_type",
    "contract_form",
    "contract_duration",
    "liquidated_damages",
    "advance_payment",
    "retention",
    "performance_bond",
    "warranty_period",
    "payment_terms",
    "sustainability",
    "consultants",
];

/// Closed category set for checklist items; anything else is coerced
/// to `GENERAL`.
pub const CHECKLIST_CATEGORIES: [&str; 10] = [
    "SUBMISSION",
    "QUALIFICATION",
    "TECHNICAL",
    "COMMERCIAL",
    "LEGAL",
    "HSE",
    "QUALITY",
    "SCHEDULE",
    "BONDS",
    "DOCUMENTATION",
];

/// Hard ceiling on one document's excerpt inside a prompt, applied
/// after the caller's own budget.
const MAX_EXCERPT_CHARS: usize = 15000;

/// One document excerpt handed to a prompt builder.
#[derive(Debug, Clone)]
pub struct DocContext {
    pub filename: String,
    pub content: String,
    pub category: String,
}

/// Truncate to a character budget with an explicit marker, so the
/// model knows content was cut rather than absent.
pub fn truncate_content(content: &str, budget: usize) -> String {
    if content.chars().count() <= budget {
        return content.to_string();
    }
    let head: String = content.chars().take(budget).collect();
    format!("{}\n...[truncated]...", head)
}

fn render_context(documents: &[DocContext], with_category: bool) -> String {
    let mut parts = Vec::with_capacity(documents.len());
    for doc in documents {
        let content = truncate_content(&doc.content, MAX_EXCERPT_CHARS);
        if with_category {
            parts.push(format!(
                "\n### Document: {}\nCategory: {}\n\n{}\n",
                doc.filename, doc.category, content
            ));
        } else {
            parts.push(format!("\n### Document: {}\n\n{}\n", doc.filename, content));
        }
    }
    parts.join("\n---\n")
}

const SUMMARY_PROMPT: &str = r#"You are an expert construction tender analyst. Your task is to extract key project information from tender documents.

## Instructions

1. Carefully analyze the provided document excerpts
2. Extract each requested field with its exact value as found in the documents
3. Provide a confidence score (0.0 to 1.0) for each extraction
4. Include evidence citations showing where you found each piece of information
5. If information is not found, set value to null and confidence to 0

## Fields to Extract

### Project Identification
- **project_name**: Official project name/title
- **project_owner**: The entity issuing the tender (client/employer)
- **main_contractor**: If specified, the contractor bidding
- **location**: Project location/site address

### Key Dates
- **submission_deadline**: Tender submission deadline (date and time)
- **site_visit_date**: Mandatory or optional site visit date
- **clarification_deadline**: Last date for clarification queries

### Scope
- **scope_of_work**: Brief description of works included

### Commercial Terms
- **tender_bond**: Required tender bond amount and form
- **contract_type**: Lump Sum, Remeasured, or Hybrid
- **contract_form**: Form of contract (FIDIC, NEC, JCT, etc.)
- **contract_duration**: Expected project duration
- **liquidated_damages**: LD amount per day/week
- **advance_payment**: Advance payment percentage
- **retention**: Retention percentage
- **performance_bond**: Performance bond percentage
- **warranty_period**: Defects liability/warranty period
- **payment_terms**: Payment cycle and terms

### Other
- **sustainability**: LEED/sustainability/green building requirements
- **consultants**: List of consultants, PMC, designers

## Document Context

{context}

## Response Format

Respond with a JSON object. For each field, provide:
- "value": The extracted value (string, number, or null if not found)
- "confidence": Confidence score from 0.0 to 1.0
- "evidence": Array of citations with document, page, and relevant snippet

Example:
```json
{
  "project_name": {
    "value": "Marina Tower Development Phase 2",
    "confidence": 0.95,
    "evidence": [
      {
        "document": "ITT_Document.pdf",
        "page": "1",
        "snippet": "Invitation to Tender for Marina Tower Development Phase 2"
      }
    ]
  }
}
```

Be precise. Never fabricate information. Lower confidence for ambiguous findings."#;

/// Build the summary extraction prompt around the gathered excerpts.
pub fn build_summary_prompt(documents: &[DocContext]) -> String {
    SUMMARY_PROMPT.replace("{context}", &render_context(documents, false))
}

const CHECKLIST_PROMPT: &str = r#"You are an expert tender compliance analyst. Your task is to extract all requirements from tender documents that a contractor must comply with.

## Instructions

1. Analyze the provided tender documents carefully
2. Identify ALL requirements, obligations, and conditions
3. Categorize each requirement appropriately
4. Mark mandatory requirements (using words like "shall", "must", "required")
5. Include document references for traceability

## Categories to Use

- **SUBMISSION**: Document submission requirements
- **QUALIFICATION**: Pre-qualification and eligibility requirements
- **TECHNICAL**: Technical specifications and standards
- **COMMERCIAL**: Pricing, payment, and financial requirements
- **LEGAL**: Legal, insurance, and contractual requirements
- **HSE**: Health, Safety, and Environment requirements
- **QUALITY**: Quality assurance and control requirements
- **SCHEDULE**: Timeline and milestone requirements
- **BONDS**: Bond and guarantee requirements
- **DOCUMENTATION**: Required documents and certifications

## Document Context

{context}

## Response Format

Respond with a JSON object containing a "requirements" array:

```json
{
  "requirements": [
    {
      "id": 1,
      "category": "SUBMISSION",
      "requirement": "Submit tender in sealed envelope",
      "description": "Tender must be submitted in a sealed envelope marked with project name and tender reference",
      "mandatory": true,
      "source_document": "ITT_Document.pdf",
      "source_reference": "Section 3.1, Page 5",
      "responsible_party": "Tenderer",
      "deadline": "2024-03-15 14:00",
      "deliverable": "Sealed tender envelope"
    }
  ]
}
```

## Important Notes

- Extract EVERY requirement, even if seemingly minor
- "Shall", "must", "required" indicate mandatory requirements
- "Should", "may", "recommended" indicate non-mandatory items
- Include specific quantities, percentages, and deadlines where mentioned

Be thorough. Missing a requirement could lead to disqualification."#;

/// Filenames and categories that should lead the checklist context.
const CHECKLIST_PRIORITY_KEYWORDS: [&str; 5] = [
    "itt",
    "instruction",
    "condition",
    "requirement",
    "qualification",
];

/// Build the checklist prompt; instruction-bearing documents sort to
/// the front of the context.
pub fn build_checklist_prompt(documents: &[DocContext]) -> String {
    let mut sorted: Vec<&DocContext> = documents.iter().collect();
    sorted.sort_by_key(|doc| {
        let filename = doc.filename.to_lowercase();
        let category = doc.category.to_lowercase();
        CHECKLIST_PRIORITY_KEYWORDS
            .iter()
            .position(|kw| filename.contains(kw) || category.contains(kw))
            .unwrap_or(CHECKLIST_PRIORITY_KEYWORDS.len())
    });
    let sorted_owned: Vec<DocContext> = sorted.into_iter().cloned().collect();
    CHECKLIST_PROMPT.replace("{context}", &render_context(&sorted_owned, true))
}

const CLASSIFICATION_PROMPT: &str = r#"Classify the following document into one of these categories based on its content:

Categories:
- ITT: Invitation to Tender, Instructions to Bidders, RFP
- SPECS: Technical Specifications, Requirements
- BOQ: Bill of Quantities, Schedule of Rates, Pricing Schedules
- DRAWINGS: Architectural/Engineering Drawings, Plans
- CONTRACT: Contract Documents, Agreements, Terms
- ADDENDUM: Addenda, Amendments, Revisions
- CORRESPONDENCE: Letters, Emails, Communications
- SCHEDULE: Project Schedule, Programme, Timeline
- HSE: Health, Safety, Environment documents
- GENERAL: Other documents

Document filename: {filename}

Document content (first 2000 characters):
{content}

Respond with JSON:
{
  "category": "CATEGORY_NAME",
  "confidence": 0.0-1.0,
  "reasoning": "Brief explanation"
}"#;

/// Build the LLM classification prompt for one document.
pub fn build_classification_prompt(filename: &str, content: &str) -> String {
    CLASSIFICATION_PROMPT
        .replace("{filename}", filename)
        .replace("{content}", &truncate_content(content, 2000))
}

/// Build the grounded Q&A prompt from retrieved chunk contexts, each
/// labeled with its source filename and page.
pub fn build_qa_prompt(query: &str, contexts: &[(String, Option<i64>, String)]) -> String {
    let context_blocks: Vec<String> = contexts
        .iter()
        .map(|(filename, page, text)| {
            let page_label = page
                .map(|p| p.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            format!("\nDocument: {}\nPage: {}\n\n{}\n", filename, page_label, text)
        })
        .collect();

    format!(
        r#"Based on the following document excerpts, answer the question.
If the answer cannot be found in the excerpts, say so clearly.
Always cite which document contains the information.

## Question:
{}

## Document Excerpts:
{}

## Instructions:
1. Answer the question based only on the provided excerpts
2. Cite the source document for each piece of information
3. If information is unclear or conflicting, note the ambiguity
4. Be concise but complete

Answer:"#,
        query,
        context_blocks.join("\n---\n")
    )
}

/// Build the per-chunk date extraction prompt.
pub fn build_date_prompt(chunk_text: &str) -> String {
    format!(
        r#"Extract any dates mentioned in this text.
For each date found, provide:
- The date (in YYYY-MM-DD format if possible)
- What the date represents (deadline, milestone, etc.)
- The exact text where it was found

Text:
{}

Respond with JSON:
{{"dates": [{{"date": "YYYY-MM-DD or original text", "type": "what it represents", "context": "surrounding text"}}]}}"#,
        chunk_text
    )
}

/// The fixed semantic queries driving key-date extraction.
pub const DATE_QUERIES: [&str; 7] = [
    "submission deadline tender due date",
    "site visit inspection date",
    "clarification deadline queries",
    "award date contract signing",
    "commencement start date",
    "completion end date",
    "milestones schedule",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(filename: &str, category: &str, content: &str) -> DocContext {
        DocContext {
            filename: filename.to_string(),
            category: category.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn truncation_appends_marker_only_when_needed() {
        assert_eq!(truncate_content("short", 100), "short");
        let long = "y".repeat(200);
        let truncated = truncate_content(&long, 50);
        assert!(truncated.starts_with(&"y".repeat(50)));
        assert!(truncated.ends_with("...[truncated]..."));
    }

    #[test]
    fn summary_prompt_embeds_every_document() {
        let prompt = build_summary_prompt(&[
            doc("ITT.pdf", "itt", "tender details"),
            doc("Contract.docx", "contract", "contract terms"),
        ]);
        assert!(prompt.contains("### Document: ITT.pdf"));
        assert!(prompt.contains("### Document: Contract.docx"));
        assert!(prompt.contains("tender details"));
        assert!(prompt.contains("Never fabricate information"));
    }

    #[test]
    fn checklist_prompt_sorts_instruction_documents_first() {
        let prompt = build_checklist_prompt(&[
            doc("General_Notes.pdf", "general", "notes"),
            doc("ITT_Volume1.pdf", "itt", "instructions"),
        ]);
        let itt = prompt.find("ITT_Volume1.pdf").unwrap();
        let notes = prompt.find("General_Notes.pdf").unwrap();
        assert!(itt < notes);
    }

    #[test]
    fn classification_prompt_truncates_to_head() {
        let content = "z".repeat(5000);
        let prompt = build_classification_prompt("spec.pdf", &content);
        assert!(prompt.contains("spec.pdf"));
        assert!(prompt.contains("...[truncated]..."));
        assert!(prompt.chars().filter(|c| *c == 'z').count() <= 2000);
    }

    #[test]
    fn qa_prompt_labels_sources() {
        let prompt = build_qa_prompt(
            "What is the retention?",
            &[("Contract.pdf".to_string(), Some(14), "Retention is 5%.".to_string())],
        );
        assert!(prompt.contains("Document: Contract.pdf"));
        assert!(prompt.contains("Page: 14"));
        assert!(prompt.contains("Retention is 5%."));
    }
}
