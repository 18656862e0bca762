pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_observables.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_observables.sql")),
				"tables/002_tags.sql" => out.push_str(include_str!("../../../sql/tables/002_tags.sql")),
				"tables/003_alert_observable_mapping.sql" => out
					.push_str(include_str!("../../../sql/tables/003_alert_observable_mapping.sql")),
				"tables/004_alert_tag_mapping.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_alert_tag_mapping.sql")),
				"tables/005_alert_observable_tag_index.sql" => out.push_str(include_str!(
					"../../../sql/tables/005_alert_observable_tag_index.sql"
				)),
				"tables/006_index_rebuild_outbox.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_index_rebuild_outbox.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
