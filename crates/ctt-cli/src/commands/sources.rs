//! Sources command: list configured feeds and their derived attributes.

use std::io::Write;

use anyhow::Result;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let sources = config.resolved_sources();
    if sources.is_empty() {
        writeln!(writer, "No sources configured.")?;
        return Ok(());
    }

    for source in sources {
        writeln!(writer, "{}", source.display_name)?;
        writeln!(writer, "  id:       {}", source.id)?;
        writeln!(writer, "  category: {}", source.category)?;
        writeln!(writer, "  color:    {}", source.color)?;
        writeln!(writer, "  address:  {}", source.address)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use ctt_core::{SourceId, distinct_color};
    use insta::assert_snapshot;

    use crate::config::SourceConfig;

    #[test]
    fn lists_sources_with_fallbacks() {
        let config = Config {
            sources: vec![
                SourceConfig {
                    address: "https://example.com/work.ics".to_string(),
                    name: Some("[Imported] Work".to_string()),
                    category: Some("Job".to_string()),
                    color: Some("#112233".to_string()),
                },
                SourceConfig {
                    address: "/home/me/gym.ics".to_string(),
                    name: None,
                    category: None,
                    color: None,
                },
            ],
            ..Config::default()
        };

        let mut output = Vec::new();
        run(&mut output, &config).unwrap();
        let output = String::from_utf8(output)
            .unwrap()
            .replace(
                SourceId::from_address("https://example.com/work.ics").as_str(),
                "[WORK-ID]",
            )
            .replace(
                SourceId::from_address("/home/me/gym.ics").as_str(),
                "[GYM-ID]",
            )
            .replace(&distinct_color(1, 2), "[COLOR]");

        assert_snapshot!(output, @r"
        Work
          id:       [WORK-ID]
          category: Job
          color:    #112233
          address:  https://example.com/work.ics
        Unnamed
          id:       [GYM-ID]
          category: Unnamed
          color:    [COLOR]
          address:  /home/me/gym.ics
        ");
    }

    #[test]
    fn empty_configuration() {
        let mut output = Vec::new();
        run(&mut output, &Config::default()).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @"No sources configured.");
    }
}
