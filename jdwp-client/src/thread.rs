// ThreadReference command implementations
//
// Commands for working with threads (name, frames, resume)

use crate::commands::{command_sets, thread_commands};
use crate::connection::JdwpConnection;
use crate::protocol::{CommandPacket, JdwpResult};
use crate::reader::{read_i32, read_location, read_string, read_u64};
use crate::types::{FrameInfo, ThreadId};
use bytes::BufMut;

impl JdwpConnection {
    /// Get stack frames for a thread (ThreadReference.Frames command)
    ///
    /// `start_frame` 0 is the top frame; `length` -1 means all remaining frames.
    /// The thread must be suspended.
    pub async fn get_frames(
        &self,
        thread_id: ThreadId,
        start_frame: i32,
        length: i32,
    ) -> JdwpResult<Vec<FrameInfo>> {
        let id = self.next_id();
        let mut packet =
            CommandPacket::new(id, command_sets::THREAD_REFERENCE, thread_commands::FRAMES);

        packet.data.put_u64(thread_id);
        packet.data.put_i32(start_frame);
        packet.data.put_i32(length);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();

        let frames_count = read_i32(&mut data)?;
        let mut frames = Vec::with_capacity(frames_count.max(0) as usize);

        for _ in 0..frames_count {
            let frame_id = read_u64(&mut data)?;
            let location = read_location(&mut data)?;
            frames.push(FrameInfo { frame_id, location });
        }

        Ok(frames)
    }

    /// Get a thread's name (ThreadReference.Name command)
    pub async fn get_thread_name(&self, thread_id: ThreadId) -> JdwpResult<String> {
        let id = self.next_id();
        let mut packet =
            CommandPacket::new(id, command_sets::THREAD_REFERENCE, thread_commands::NAME);

        packet.data.put_u64(thread_id);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();
        read_string(&mut data)
    }

    /// Resume a single thread (ThreadReference.Resume command)
    pub async fn resume_thread(&self, thread_id: ThreadId) -> JdwpResult<()> {
        let id = self.next_id();
        let mut packet =
            CommandPacket::new(id, command_sets::THREAD_REFERENCE, thread_commands::RESUME);

        packet.data.put_u64(thread_id);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        Ok(())
    }
}
