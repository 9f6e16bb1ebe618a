use sxmrelay::Channel;

/// Slot used to sort channels without a numeric dial position
const UNKNOWN_DIAL: u32 = 9999;

/// Favorites first, then by dial position.
pub fn sort_channels(channels: &mut [Channel]) {
    channels.sort_by_key(|c| (!c.favorite, c.dial().unwrap_or(UNKNOWN_DIAL)));
}

/// Aligned `ID | Num | Name` table, one channel per line.
pub fn format_channel_table(channels: &[Channel]) -> String {
    let id_width = column_width("ID", channels.iter().map(|c| c.id.as_str()));
    let num_width = column_width("Num", channels.iter().map(|c| c.number.as_str()));
    let name_width = column_width("Name", channels.iter().map(|c| c.name.as_str()));

    let mut table = format!(
        "{:<id_width$} | {:<num_width$} | {:<name_width$}\n",
        "ID", "Num", "Name"
    );
    for channel in channels {
        let number = if channel.number.is_empty() {
            "??"
        } else {
            channel.number.as_str()
        };
        table.push_str(&format!(
            "{:<id_width$} | {:<num_width$} | {:<name_width$}\n",
            channel.id, number, channel.name
        ));
    }
    table
}

fn column_width<'a>(header: &str, values: impl Iterator<Item = &'a str>) -> usize {
    values
        .map(|v| v.chars().count())
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(0)
}
