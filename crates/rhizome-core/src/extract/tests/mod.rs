mod tests_extract_file;
