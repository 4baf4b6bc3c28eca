//! 标准输入输出传输
//!
//! stdin 每行一个命令，stdout 每行一个事件。日志只写 stderr。

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

use super::protocol::{BridgeCommand, BridgeEvent};

/// 单行命令最大长度
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// 读取命令并送入通道
///
/// 无法解析的行记录日志后跳过；输入结束时发送 `Shutdown`。
pub async fn read_commands<R>(reader: R, commands: mpsc::Sender<BridgeCommand>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                tracing::warn!("[传输] 命令行过长，已丢弃");
                continue;
            }
            Err(LinesCodecError::Io(e)) => {
                tracing::error!("[传输] 读取输入失败: {}", e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<BridgeCommand>(line) {
            Ok(command) => {
                if commands.send(command).await.is_err() {
                    return;
                }
            }
            Err(e) => tracing::warn!("[传输] 无法解析命令: {}, line={}", e, line),
        }
    }

    tracing::info!("[传输] 输入已结束");
    let _ = commands.send(BridgeCommand::Shutdown).await;
}

/// 将事件逐行写出，直到通道关闭
pub async fn write_events<W>(
    writer: W,
    mut events: mpsc::Receiver<BridgeEvent>,
) -> Result<(), LinesCodecError>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, LinesCodec::new());

    while let Some(event) = events.recv().await {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("[传输] 序列化事件失败: {}", e);
                continue;
            }
        };
        sink.send(line).await?;
    }

    SinkExt::<String>::flush(&mut sink).await?;
    Ok(())
}
