mod tests_index;
