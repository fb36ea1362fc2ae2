use crate::domain::{ContextChunk, DomainError, PromptTemplate, RenderedPrompt};

/// Substituted for `{context}` when no chunk survives.
pub const NO_CONTEXT: &str = "No relevant documents were found.";

/// A rendered prompt together with the chunks that made it in.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub prompt: RenderedPrompt,
    pub used: Vec<ContextChunk>,
}

/// Renders context and query through a provider template, dropping the
/// least relevant chunks until the prompt fits the provider's input limit.
#[derive(Debug, Clone, Copy)]
pub struct PromptAssembler<'a> {
    template: &'a PromptTemplate,
    max_chars: usize,
}

impl<'a> PromptAssembler<'a> {
    pub fn new(template: &'a PromptTemplate, max_chars: usize) -> Self {
        Self {
            template,
            max_chars,
        }
    }

    pub fn assemble(
        &self,
        query: &str,
        chunks: &[ContextChunk],
    ) -> Result<AssembledPrompt, DomainError> {
        let mut used: Vec<&ContextChunk> =
            chunks.iter().filter(|c| !c.text.trim().is_empty()).collect();

        loop {
            let prompt = self.template.render(&context_block(&used), query);
            if prompt.char_len() <= self.max_chars {
                return Ok(AssembledPrompt {
                    prompt,
                    used: used.into_iter().cloned().collect(),
                });
            }
            match weakest(&used) {
                Some(index) => {
                    used.remove(index);
                }
                None => {
                    return Err(DomainError::invalid(format!(
                        "query too long: prompt is {} characters, provider accepts {}",
                        prompt.char_len(),
                        self.max_chars
                    )))
                }
            }
        }
    }
}

fn context_block(chunks: &[&ContextChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT.to_string();
    }
    chunks
        .iter()
        .map(|c| c.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Index of the lowest-scored chunk; the later one wins ties.
fn weakest(chunks: &[&ContextChunk]) -> Option<usize> {
    let mut weakest: Option<usize> = None;
    for (index, chunk) in chunks.iter().enumerate() {
        match weakest {
            Some(current) if chunks[current].score < chunk.score => {}
            _ => weakest = Some(index),
        }
    }
    weakest
}
