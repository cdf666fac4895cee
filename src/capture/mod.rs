//! # Capture Module
//!
//! Decodes traffic sniffed from the servo line into register transactions.
//!
//! The input is a stream of UART-decoded bytes containing both directions of
//! the conversation, e.g. a logic analyzer export or a USB-UART adapter with
//! RX inversion enabled listening on the line at 115200 baud.
//!
//! This module handles:
//! - Pairing read requests with their responses
//! - Skipping glitch zero bytes between frames
//! - Flagging checksum failures without dropping the transaction
//! - Reporting unexpected bytes and resynchronising on the next frame
//! - Writing transactions to rotating JSONL files ([`logger`])

pub mod logger;

use std::fmt;

use bytes::{Buf, BytesMut};
use serde::Serialize;

use crate::protocol::checksum::checksum;
use crate::protocol::protocol::*;
use crate::protocol::registers;

/// One decoded exchange, or a decoding problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transaction {
    Read {
        register: u8,
        name: String,
        value: u16,
        mystery: u8,
        checksum_ok: bool,
    },
    Write {
        register: u8,
        name: String,
        value: u16,
        checksum_ok: bool,
    },
    Error {
        context: String,
        actual: u8,
        expected: Vec<u8>,
    },
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (verb, name, value, checksum_ok) = match self {
            Transaction::Read { name, value, checksum_ok, .. } => ("read", name, value, checksum_ok),
            Transaction::Write { name, value, checksum_ok, .. } => ("write", name, value, checksum_ok),
            Transaction::Error { context, actual, expected } => {
                let expected: Vec<String> = expected.iter().map(|e| format!("0x{:02X}", e)).collect();
                return write!(
                    f,
                    "error in {}: got 0x{:02X}, expected {}",
                    context,
                    actual,
                    expected.join(",")
                );
            }
        };

        write!(f, "{} {}=0x{:04X}={}", verb, name, value, value)?;
        if !checksum_ok {
            write!(f, " (INVALID CHECKSUM)")?;
        }
        Ok(())
    }
}

/// Running totals for a capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub reads: u64,
    pub writes: u64,
    pub errors: u64,
    pub checksum_failures: u64,
}

impl DecoderStats {
    fn record(&mut self, transaction: &Transaction) {
        match transaction {
            Transaction::Read { checksum_ok, .. } => {
                self.reads += 1;
                self.checksum_failures += u64::from(!checksum_ok);
            }
            Transaction::Write { checksum_ok, .. } => {
                self.writes += 1;
                self.checksum_failures += u64::from(!checksum_ok);
            }
            Transaction::Error { .. } => self.errors += 1,
        }
    }
}

/// Reads through a buffer, collecting error records as it goes
///
/// Every accessor returns `None` when the buffer runs out, which means the
/// frame is incomplete and parsing should resume once more bytes arrive.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    records: Vec<Transaction>,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            records: Vec::new(),
        }
    }

    fn get(&mut self) -> Option<u8> {
        let byte = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    /// Consume one byte and report it if it is not one of `expected`
    fn expect(&mut self, expected: &[u8], context: &str) -> Option<bool> {
        let actual = self.get()?;
        if expected.contains(&actual) {
            return Some(true);
        }
        self.records.push(Transaction::Error {
            context: context.to_string(),
            actual,
            expected: expected.to_vec(),
        });
        Some(false)
    }

    fn skip_zeros(&mut self) -> Option<()> {
        while *self.buf.get(self.pos)? == 0x00 {
            self.pos += 1;
        }
        Some(())
    }

    fn done(self) -> Option<(usize, Vec<Transaction>)> {
        Some((self.pos, self.records))
    }
}

/// Parse one transaction from the front of `buf`
///
/// Returns the number of bytes consumed and the records produced, or `None`
/// if `buf` ends partway through the transaction.
fn parse_transaction(buf: &[u8]) -> Option<(usize, Vec<Transaction>)> {
    let mut c = Cursor::new(buf);

    if !c.expect(&[HD_REQUEST_MARKER], "start of command")? {
        return c.done();
    }
    // Some hosts send 0xFF here instead of 0x00
    c.expect(&[0x00, 0xFF], "byte after start of command")?;
    let register = c.get()?;
    let name = registers::display_name(register);

    match c.get()? {
        HD_LENGTH_READ => {
            c.expect(&[checksum(&[0x00, register, HD_LENGTH_READ])], "request checksum")?;
            c.skip_zeros()?;
            if !c.expect(&[HD_RESPONSE_MARKER], "start of reply")? {
                return c.done();
            }
            let mystery = c.get()?;
            c.expect(&[register], "echoed register")?;
            c.expect(&[HD_LENGTH_VALUE], "reply length")?;
            let low = c.get()?;
            let high = c.get()?;
            let received = c.get()?;

            c.records.push(Transaction::Read {
                register,
                name,
                value: RegisterBytes { low, high }.value(),
                mystery,
                checksum_ok: received == checksum(&[mystery, register, HD_LENGTH_VALUE, low, high]),
            });
        }
        HD_LENGTH_VALUE => {
            let low = c.get()?;
            let high = c.get()?;
            let received = c.get()?;

            c.records.push(Transaction::Write {
                register,
                name,
                value: RegisterBytes { low, high }.value(),
                checksum_ok: received == checksum(&[0x00, register, HD_LENGTH_VALUE, low, high]),
            });
        }
        other => {
            c.records.push(Transaction::Error {
                context: "length byte".to_string(),
                actual: other,
                expected: vec![HD_LENGTH_READ, HD_LENGTH_VALUE],
            });
        }
    }

    c.done()
}

/// Incremental decoder for sniffed line traffic
///
/// # Examples
///
/// ```
/// use hitecd_servo::capture::{TrafficDecoder, Transaction};
///
/// let mut decoder = TrafficDecoder::new();
/// let transactions = decoder.push(&[0x96, 0x00, 0x32, 0x02, 0x07, 0x00, 0x3B]);
/// assert!(matches!(transactions[0], Transaction::Write { register: 0x32, value: 7, .. }));
/// ```
#[derive(Debug, Default)]
pub struct TrafficDecoder {
    buffer: BytesMut,
    stats: DecoderStats,
}

impl TrafficDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes in and take out every transaction they complete
    pub fn push(&mut self, data: &[u8]) -> Vec<Transaction> {
        self.buffer.extend_from_slice(data);

        let mut transactions = Vec::new();
        loop {
            // Glitches on the line show up as zero bytes between frames
            let zeros = self.buffer.iter().take_while(|&&b| b == 0x00).count();
            self.buffer.advance(zeros);

            if self.buffer.is_empty() {
                break;
            }

            match parse_transaction(&self.buffer) {
                Some((consumed, records)) => {
                    self.buffer.advance(consumed);
                    transactions.extend(records);
                }
                None => break,
            }
        }

        for transaction in &transactions {
            self.stats.record(transaction);
        }
        transactions
    }

    /// Flush whatever is left at the end of the stream
    ///
    /// A trailing partial frame is reported as a single truncation error.
    pub fn finish(&mut self) -> Vec<Transaction> {
        if self.buffer.is_empty() {
            return Vec::new();
        }

        let error = Transaction::Error {
            context: format!("truncated frame ({} bytes)", self.buffer.len()),
            actual: self.buffer[0],
            expected: Vec::new(),
        };
        self.buffer.clear();
        self.stats.record(&error);
        vec![error]
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }
}
