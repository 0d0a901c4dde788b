use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use autoprobe_core::api::{DecisionRequest, InferenceClient, InferenceError};

type Input = Box<dyn AsyncBufRead + Send + Unpin>;
type Output = Box<dyn AsyncWrite + Send + Unpin>;

/// Debug inference: shows each prompt on the terminal and reads the action
/// JSON typed by the operator, terminated by an empty line.
pub struct ConsoleInference {
    input: Mutex<Input>,
    output: Mutex<Output>,
}

impl ConsoleInference {
    pub fn new(input: Input, output: Output) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    pub fn stdio() -> Self {
        Self::new(
            Box::new(BufReader::new(tokio::io::stdin())),
            Box::new(tokio::io::stderr()),
        )
    }

    async fn read_answer(&self) -> Result<String, InferenceError> {
        let mut input = self.input.lock().await;
        let mut answer = String::new();
        loop {
            let mut line = String::new();
            let read = input
                .read_line(&mut line)
                .await
                .map_err(|e| InferenceError::Transport(format!("reading console input: {e}")))?;
            if read == 0 || (line.trim().is_empty() && !answer.trim().is_empty()) {
                break;
            }
            answer.push_str(&line);
        }
        if answer.trim().is_empty() {
            return Err(InferenceError::EmptyResponse);
        }
        Ok(answer.trim().to_string())
    }
}

#[async_trait]
impl InferenceClient for ConsoleInference {
    fn name(&self) -> &str {
        "console"
    }

    async fn decide(&self, request: &DecisionRequest) -> Result<String, InferenceError> {
        {
            let mut out = self.output.lock().await;
            let banner = format!(
                "\n===== task {} step {} ({} mode) =====\n{}\n\nnext action JSON (end with an empty line):\n",
                request.task_id, request.step, request.mode, request.prompt
            );
            out.write_all(banner.as_bytes())
                .await
                .map_err(|e| InferenceError::Transport(format!("writing console prompt: {e}")))?;
            let _ = out.flush().await;
        }
        self.read_answer().await
    }
}
