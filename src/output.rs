//! Flat text dump of a captured buffer.

use std::io::{self, Write};

use chrono::{DateTime, TimeZone};

use crate::sequencer::Acquisition;
use crate::transport::ChannelOrder;

/// Writes a `#` comment header followed by one sample per line, in buffer order.
pub fn write_csv<W: Write, Tz: TimeZone>(
    mut out: W,
    acquisition: &Acquisition,
    captured_at: &DateTime<Tz>,
) -> io::Result<()>
where
    Tz::Offset: std::fmt::Display,
{
    writeln!(
        out,
        "# captured {}",
        captured_at.format("%Y-%m-%d %H:%M:%S %z")
    )?;
    writeln!(
        out,
        "# channels {} samples_per_channel {} firmware {} order {}",
        acquisition.channels.count(),
        acquisition.samples_per_channel,
        acquisition.firmware_version(),
        match acquisition.order {
            ChannelOrder::AFirst => "A",
            ChannelOrder::BFirst => "B",
        }
    )?;
    for sample in &acquisition.samples {
        writeln!(out, "{sample}")?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelCount;
    use crate::registers::{RegisterAddress, RegisterSnapshot};
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn header_then_one_sample_per_line() {
        let mut registers = RegisterSnapshot::default();
        registers.set(RegisterAddress::FIRMWARE_VERSION_LSB, 7);
        let acquisition = Acquisition {
            channels: ChannelCount::from_code(1).unwrap(),
            samples_per_channel: 2,
            samples: vec![1, 2, 300, 16_777_215],
            order: ChannelOrder::AFirst,
            initial_registers: registers.clone(),
            configured_registers: registers,
        };
        let captured_at = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 2, 27, 12, 30, 0)
            .unwrap();

        let mut buffer = Vec::new();
        write_csv(&mut buffer, &acquisition, &captured_at).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "# captured 2024-02-27 12:30:00 +0000\n\
             # channels 2 samples_per_channel 2 firmware 7 order A\n\
             1\n2\n300\n16777215\n"
        );
    }
}
