pub mod payload;
pub mod statistic;

use serde::Serialize;

#[derive(PartialEq, Debug, Clone, Copy, Serialize)]
pub enum TestCase {
    Echo,
    Send,
    Recv,
}

pub fn parse_testcase(testcase: &str) -> Option<TestCase> {
    match testcase {
        "echo" => Some(TestCase::Echo),
        "send" => Some(TestCase::Send),
        "recv" => Some(TestCase::Recv),
        _ => None,
    }
}

/// Maps a number to the character of the repeating fill pattern.
pub fn num_to_char(num: usize) -> char {
    match num {
        0..=9 => (b'0' + num as u8) as char,
        10..=15 => (b'a' + (num - 10) as u8) as char,
        _ => ' ',
    }
}
