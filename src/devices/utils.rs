//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Device driver utilities.
//!

use crate::devices::{transport, DeviceError};
use std::io::{BufRead, Read};

const MAX_LINE_LEN: usize = 1024;

#[derive(Debug)]
pub enum ResponseType {
    None,
    /// Reply is one line that must begin with the given text.
    LineStartingWith(String),
    Line
}

pub enum InvalidResponseTreatment {
    Fail,
    Ignore{ log_warning: bool }
}

fn too_long() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, "response has too many characters")
}

/// Reads delimiter-terminated lines, keeping a partially received line across read timeouts.
pub struct LineReader<R: std::io::Read> {
    reader: std::io::BufReader<R>,
    partial: Vec<u8>,
    delimiter: u8
}

impl<R: std::io::Read> LineReader<R> {
    pub fn new(reader: R) -> LineReader<R> {
        LineReader::with_delimiter(reader, b'\n')
    }

    pub fn with_delimiter(reader: R, delimiter: u8) -> LineReader<R> {
        LineReader{ reader: std::io::BufReader::new(reader), partial: vec![], delimiter }
    }

    /// Returns the next line without its terminator (the delimiter, plus any `\r`), or `None` if the read
    /// timed out before a complete line arrived. End of stream is reported as `UnexpectedEof`, a line longer
    /// than `MAX_LINE_LEN` as `InvalidData`.
    pub fn read_line(&mut self) -> std::io::Result<Option<String>> {
        // at most one byte past the limit is read, so a peer that never sends the delimiter cannot grow `partial`
        let limit = MAX_LINE_LEN.saturating_sub(self.partial.len()) as u64 + 1;
        let result = (&mut self.reader).take(limit).read_until(self.delimiter, &mut self.partial);

        match result {
            Ok(0) => Err(std::io::ErrorKind::UnexpectedEof.into()),

            Ok(_) => {
                if self.partial.last() == Some(&self.delimiter) {
                    let delimiter = self.delimiter as char;
                    let line = String::from_utf8_lossy(&self.partial)
                        .trim_end_matches(|c| c == delimiter || c == '\r' || c == '\n')
                        .trim_start_matches(|c| c == '\r' || c == '\n')
                        .to_string();
                    self.partial.clear();
                    Ok(Some(line))
                } else if self.partial.len() > MAX_LINE_LEN {
                    self.partial.clear();
                    Err(too_long())
                } else {
                    // stream ended in the middle of a line
                    self.partial.clear();
                    Err(std::io::ErrorKind::UnexpectedEof.into())
                }
            },

            Err(e) if transport::is_timeout(&e) => {
                if self.partial.len() > MAX_LINE_LEN {
                    self.partial.clear();
                    return Err(too_long());
                }
                Ok(None)
            },

            Err(e) => Err(e)
        }
    }
}

/// Sends `cmd` and reads a one-line reply from `reader`; `writer` and `reader` are two handles of the same link.
pub fn send_cmd_and_get_reply<W: std::io::Write, R: std::io::Read>(
    writer: &mut W,
    reader: &mut LineReader<R>,
    cmd: &str,
    response_type: ResponseType,
    on_invalid_resp: InvalidResponseTreatment
) -> Result<String, DeviceError> {
    writer.write_all(cmd.as_bytes())?;
    writer.flush()?;

    if let ResponseType::None = response_type { return Ok(String::new()); }

    let reply = reader.read_line()?;

    let reply_error = match (&reply, &response_type) {
        (None, _) => true,
        (Some(line), ResponseType::LineStartingWith(prefix)) => !line.starts_with(prefix.as_str()),
        (Some(_), _) => false
    };

    if reply_error {
        let message = format!("cmd \"{}\" failed to get expected response: {:?}", cmd.trim_end(), response_type);
        match on_invalid_resp {
            InvalidResponseTreatment::Fail => return Err(DeviceError::InvalidResponse(message)),
            InvalidResponseTreatment::Ignore{ log_warning } => if log_warning { log::warn!("{}", message); }
        }
    }

    Ok(reply.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::loopback;
    use std::io::Write;

    fn reader_pair() -> (loopback::LoopbackPort, LineReader<loopback::LoopbackPort>) {
        let (writer, mut reader) = loopback::pair();
        reader.set_timeout(std::time::Duration::from_millis(30));
        (writer, LineReader::new(reader))
    }

    #[test]
    fn given_crlf_terminated_line_strip_terminator() {
        let (mut writer, mut reader) = reader_pair();
        writer.write_all(b"12 REALPOS=1.0\r\n").unwrap();
        assert_eq!(Some("12 REALPOS=1.0".to_string()), reader.read_line().unwrap());
    }

    #[test]
    fn given_line_split_across_timeout_reassemble() {
        let (mut writer, mut reader) = reader_pair();
        writer.write_all(b"3 DATA INL").unwrap();
        assert_eq!(None, reader.read_line().unwrap());
        writer.write_all(b"INE X=5\n4 COMMAND COMPLETE\n").unwrap();
        assert_eq!(Some("3 DATA INLINE X=5".to_string()), reader.read_line().unwrap());
        assert_eq!(Some("4 COMMAND COMPLETE".to_string()), reader.read_line().unwrap());
    }

    #[test]
    fn given_endless_line_fail_without_waiting_for_timeout() {
        let (mut writer, mut reader) = reader_pair();
        writer.write_all(&vec![b'x'; 4 * MAX_LINE_LEN]).unwrap();
        assert_eq!(std::io::ErrorKind::InvalidData, reader.read_line().unwrap_err().kind());
        assert!(reader.partial.is_empty());
    }

    #[test]
    fn given_custom_delimiter_split_replies() {
        let (mut writer, reader) = loopback::pair();
        let mut reader = LineReader::with_delimiter(reader, b'#');
        writer.write_all(b"MON#\r\nE1F#").unwrap();
        assert_eq!(Some("MON".to_string()), reader.read_line().unwrap());
        assert_eq!(Some("E1F".to_string()), reader.read_line().unwrap());
    }

    #[test]
    fn given_closed_stream_report_eof() {
        let (writer, mut reader) = reader_pair();
        drop(writer);
        assert_eq!(std::io::ErrorKind::UnexpectedEof, reader.read_line().unwrap_err().kind());
    }

    #[test]
    fn given_unexpected_reply_fail_or_ignore() {
        let (mut device_end, host_end) = loopback::pair();
        let mut host_reader = LineReader::new(host_end.clone());
        let mut host_writer = host_end;

        device_end.write_all(b"503 NOT LOGGED IN\n").unwrap();
        assert!(send_cmd_and_get_reply(
            &mut host_writer, &mut host_reader, "port list\r\n", ResponseType::LineStartingWith("250".into()), InvalidResponseTreatment::Fail
        ).is_err());

        device_end.write_all(b"503 NOT LOGGED IN\n").unwrap();
        assert_eq!("503 NOT LOGGED IN", send_cmd_and_get_reply(
            &mut host_writer,
            &mut host_reader,
            "port list\r\n",
            ResponseType::LineStartingWith("250".into()),
            InvalidResponseTreatment::Ignore{ log_warning: false }
        ).unwrap());
    }
}
