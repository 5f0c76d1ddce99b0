use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use lazy_static::lazy_static;

use super::header::FromHeader;
use super::results::{ParsingError, ParsingResult};
use super::rfc5322::Rfc5322Parser;

static DAYS_OF_WEEK: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

static MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

// Lazily build TZ_DATA when we need it.
lazy_static! {
    static ref TZ_DATA: HashMap<&'static str, i32> = {
        let mut map = HashMap::new();
        map.insert("z", 0); // Zulu
        map.insert("ut", 0);
        map.insert("utc", 0);
        map.insert("gmt", 0);
        map.insert("pst", -28800); // UTC-8
        map.insert("pdt", -25200); // UTC-7
        map.insert("mst", -25200); // UTC-7
        map.insert("mdt", -21600); // UTC-6
        map.insert("cst", -21600); // UTC-6
        map.insert("cdt", -18000); // UTC-5
        map.insert("est", -18000); // UTC-5
        map.insert("edt", -14400); // UTC-4
        map
    };
}

fn invalid(desc: &str) -> ParsingError {
    ParsingError::InvalidDate(desc.to_string())
}

/// Parser for RFC822 style dates, as defined by Section 5.
///
/// Note that this also supports the additions as specified in
/// RFC5322 Section 3.3 while still being backward compatible, along with
/// the obsolete forms of Section 4.3: comments anywhere, two and three digit
/// years, and alphabetic zones.
pub struct Rfc822DateParser<'s> {
    parser: Rfc5322Parser<'s>,
}

impl<'s> Rfc822DateParser<'s> {
    pub fn new(s: &'s str) -> Rfc822DateParser<'s> {
        Rfc822DateParser {
            parser: Rfc5322Parser::new(s),
        }
    }

    fn consume_number(&mut self) -> Option<(u32, usize)> {
        self.parser.consume_cfws();
        let digits = self.parser.consume_while(|c| c.is_ascii_digit());
        if digits.is_empty() || digits.len() > 4 {
            return None;
        }
        digits.parse().ok().map(|n| (n, digits.len()))
    }

    fn consume_alpha(&mut self) -> Option<String> {
        self.parser.consume_cfws();
        let word = self.parser.consume_while(|c| c.is_ascii_alphabetic());
        if word.is_empty() {
            None
        } else {
            Some(word.to_ascii_lowercase())
        }
    }

    fn consume_separator(&mut self, sep: char) -> bool {
        self.parser.consume_cfws();
        if self.parser.peek() == Some(sep) {
            self.parser.consume_char();
            true
        } else {
            false
        }
    }

    fn consume_time(&mut self) -> ParsingResult<(u32, u32, u32)> {
        let (hour, _) = self
            .consume_number()
            .ok_or_else(|| invalid("expected hour, a number"))?;

        if !self.consume_separator(':') {
            return Err(invalid("expected ':' after hour"));
        }

        let (minute, _) = self
            .consume_number()
            .ok_or_else(|| invalid("expected minute"))?;

        // Seconds are optional, only try to parse if we see the next seperator.
        let second = if self.consume_separator(':') {
            self.consume_number()
                .ok_or_else(|| invalid("expected second"))?
                .0
        } else {
            0
        };

        Ok((hour, minute, second))
    }

    fn consume_timezone_offset(&mut self) -> ParsingResult<i32> {
        self.parser.consume_cfws();
        match self.parser.peek() {
            Some(sign @ '+') | Some(sign @ '-') => {
                self.parser.consume_char();
                let digits = self.parser.consume_while(|c| c.is_ascii_digit());
                if digits.len() != 4 {
                    return Err(invalid("numeric zone needs four digits"));
                }
                let i: i32 = digits
                    .parse()
                    .map_err(|_| invalid("numeric zone is not a number"))?;
                if i % 100 >= 60 {
                    return Err(invalid("numeric zone minutes out of range"));
                }
                let offset = (i / 100) * 3600 + (i % 100) * 60;
                Ok(if sign == '-' { -offset } else { offset })
            }
            // RFC 5322 4.3: a missing or unknown zone is taken as +0000
            None => Ok(0),
            Some(_) => match self.consume_alpha() {
                Some(zone) => Ok(TZ_DATA.get(&zone[..]).cloned().unwrap_or(0)),
                None => Err(invalid("unexpected text in zone")),
            },
        }
    }

    /// Consume a DateTime from the input.
    ///
    /// If successful, returns a DateTime with a fixed offset based on the
    /// timezone parsed. You may wish to deal with this in UTC, in which case
    /// you may want something like
    ///
    /// ```
    /// use chrono::Utc;
    /// use mimelite::rfc822::Rfc822DateParser;
    ///
    /// let mut p = Rfc822DateParser::new("Thu, 18 Dec 2014 21:07:22 +0100");
    /// let d = p.consume_datetime().unwrap();
    /// let as_utc = d.with_timezone(&Utc);
    ///
    /// assert_eq!(d, as_utc);
    /// ```
    pub fn consume_datetime(&mut self) -> ParsingResult<DateTime<FixedOffset>> {
        // Handle the optional day ","
        self.parser.push_position();
        match self.consume_alpha() {
            Some(ref dow) if dow.get(..3).map_or(false, |d| DAYS_OF_WEEK.contains(&d)) => {
                self.parser.commit_position();
                self.consume_separator(',');
            }
            // What we read doesn't look like a day, so go back to the start
            _ => self.parser.pop_position(),
        }

        let (day_of_month, _) = self
            .consume_number()
            .ok_or_else(|| invalid("expected day of month, a number"))?;

        let month = match self.consume_alpha() {
            Some(s) => {
                // Add one because months are 1 indexed, array is 0 indexed.
                MONTHS
                    .iter()
                    .position(|&m| s.starts_with(m))
                    .map(|i| (i + 1) as u32)
                    .ok_or_else(|| ParsingError::InvalidDate(format!("invalid month: {}", s)))?
            }
            None => return Err(invalid("expected month")),
        };

        let year = match self.consume_number() {
            // See RFC5322 4.3 for justification of obsolete year format handling.
            // 2 digit year between 0 and 49 is assumed to be in the 2000s
            Some((y, 2)) if y < 50 => y + 2000,
            // 2 digit year greater than 50 and 3 digit years are added to 1900
            Some((y, digits)) if digits < 4 => y + 1900,
            Some((y, _)) => y,
            None => return Err(invalid("expected year")),
        };

        let (hour, minute, mut second) = self.consume_time()?;
        // Leap seconds are folded into the preceding second
        if second == 60 {
            second = 59;
        }

        let tz_offset = self.consume_timezone_offset()?;

        let offset =
            FixedOffset::east_opt(tz_offset).ok_or_else(|| invalid("zone offset out of range"))?;
        let naive = NaiveDate::from_ymd_opt(year as i32, month, day_of_month)
            .and_then(|date| date.and_hms_opt(hour, minute, second))
            .ok_or_else(|| invalid("date or time out of range"))?;

        offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| invalid("ambiguous local time"))
    }
}

impl FromHeader for DateTime<FixedOffset> {
    fn from_header(value: &str) -> Option<DateTime<FixedOffset>> {
        Rfc822DateParser::new(value).consume_datetime().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset};
    use proptest::prelude::*;

    fn at(offset: i32, ymd: (i32, u32, u32), hms: (u32, u32, u32)) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(offset)
            .unwrap()
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(ymd.0, ymd.1, ymd.2)
                    .unwrap()
                    .and_hms_opt(hms.0, hms.1, hms.2)
                    .unwrap(),
            )
            .unwrap()
    }

    #[test]
    fn test_time_parse() {
        struct TimeParseTest<'s> {
            input: &'s str,
            result: Option<DateTime<FixedOffset>>,
        }

        let edt = -14400; // UTC-0400
        let cet = 3600; // UTC+0100
        let nepal = 20700; // UTC+0545
        let utc = 0; // UTC+0000
        let tests = vec![
            TimeParseTest {
                input: "Mon, 20 Jun 1982 10:01:59 EDT",
                result: Some(at(edt, (1982, 6, 20), (10, 1, 59))),
            },
            TimeParseTest {
                // Check the 2 digit date parsing logic, >=50
                input: "Mon, 20 Jun 82 10:01:59 EDT",
                result: Some(at(edt, (1982, 6, 20), (10, 1, 59))),
            },
            TimeParseTest {
                // Check the 2 digit date parsing logic, <50
                input: "Mon, 20 Jun 02 10:01:59 EDT",
                result: Some(at(edt, (2002, 6, 20), (10, 1, 59))),
            },
            TimeParseTest {
                // Three digit years are offset from 1900
                input: "20 Jun 102 10:01:59 +0000",
                result: Some(at(utc, (2002, 6, 20), (10, 1, 59))),
            },
            TimeParseTest {
                // Check the optional seconds
                input: "Mon, 20 Jun 1982 10:01 EDT",
                result: Some(at(edt, (1982, 6, 20), (10, 1, 0))),
            },
            TimeParseTest {
                // Check different TZ parsing
                input: "Mon, 20 Jun 1982 10:01:59 +0100",
                result: Some(at(cet, (1982, 6, 20), (10, 1, 59))),
            },
            TimeParseTest {
                input: "Mon, 20 Jun 1982 10:01:59 -0400",
                result: Some(at(edt, (1982, 6, 20), (10, 1, 59))),
            },
            TimeParseTest {
                // Test for wierd minute offsets in TZ
                input: "Mon, 20 Jun 1982 10:01:59 +0545",
                result: Some(at(nepal, (1982, 6, 20), (10, 1, 59))),
            },
            TimeParseTest {
                // Test for being able to skip day of week
                input: "09 Jan 2012 21:20:00 +0000",
                result: Some(at(utc, (2012, 1, 9), (21, 20, 0))),
            },
            TimeParseTest {
                // Comments and odd spacing
                input: "Fri,  1 Nov 2019 09:05:03 -0700 (PDT)",
                result: Some(at(-25200, (2019, 11, 1), (9, 5, 3))),
            },
            TimeParseTest {
                // Unknown alphabetic zones and missing zones are UTC
                input: "Tue, 1 Jul 2003 10:52:37 XYZ",
                result: Some(at(utc, (2003, 7, 1), (10, 52, 37))),
            },
            TimeParseTest {
                input: "Tue, 1 Jul 2003 10:52:37",
                result: Some(at(utc, (2003, 7, 1), (10, 52, 37))),
            },
            TimeParseTest {
                // Full day and month names
                input: "Thursday, 18 December 2014 21:07:22 GMT",
                result: Some(at(utc, (2014, 12, 18), (21, 7, 22))),
            },
            TimeParseTest {
                input: "Mon, 30 Jun 2012 23:59:60 +0000",
                result: Some(at(utc, (2012, 6, 30), (23, 59, 59))),
            },
            TimeParseTest {
                input: "Mon, 31 Feb 2012 10:00:00 +0000",
                result: None,
            },
            TimeParseTest {
                input: "Mon, 20 Jun 1982 10:01:59 +0099",
                result: None,
            },
            TimeParseTest {
                input: "Mon, 20 Foo 1982 10:01:59 +0000",
                result: None,
            },
            TimeParseTest {
                input: "yesterday",
                result: None,
            },
            TimeParseTest {
                input: "",
                result: None,
            },
        ];

        for test in tests.into_iter() {
            let mut parser = Rfc822DateParser::new(test.input);
            assert_eq!(parser.consume_datetime().ok(), test.result, "{}", test.input);
        }
    }

    #[test]
    fn test_invalid_date_error() {
        let err = Rfc822DateParser::new("Mon, 20 Foo 1982 10:01:59 +0000")
            .consume_datetime()
            .unwrap_err();
        assert_eq!(err, ParsingError::InvalidDate("invalid month: foo".to_string()));

        let err = Rfc822DateParser::new("Mon, 20 Jun 1982 10:01:59 -0460")
            .consume_datetime()
            .unwrap_err();
        assert_eq!(
            err,
            ParsingError::InvalidDate("numeric zone minutes out of range".to_string())
        );
    }

    proptest! {
        #[test]
        fn date_parse_never_panics(s in ".*") {
            let _ = Rfc822DateParser::new(&s).consume_datetime();
        }

        #[test]
        fn rfc2822_output_parses_back(secs in 0i64..4_000_000_000, offset_min in -720i32..840) {
            let offset = FixedOffset::east_opt(offset_min * 60).unwrap();
            let date = offset.timestamp_opt(secs, 0).unwrap();
            let parsed = Rfc822DateParser::new(&date.to_rfc2822()).consume_datetime();
            prop_assert_eq!(parsed, Ok(date));
        }
    }
}
